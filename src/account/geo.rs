//! Synthetic report coordinates

use rand::Rng;
use serde::Serialize;
use std::ops::RangeInclusive;

/// Latitude range of the reporting region
pub const LATITUDE_BOUNDS: RangeInclusive<f64> = 18.0..=53.55;

/// Longitude range of the reporting region
pub const LONGITUDE_BOUNDS: RangeInclusive<f64> = 73.66..=135.05;

/// Coordinates attached to a submitted report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    /// Draw a uniform point inside the reporting region, rounded to six decimals
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let latitude = rng.gen_range(LATITUDE_BOUNDS);
        let longitude = rng.gen_range(LONGITUDE_BOUNDS);
        Self {
            latitude: round6(latitude),
            longitude: round6(longitude),
        }
    }

    pub fn random() -> Self {
        Self::sample(&mut rand::thread_rng())
    }
}

impl std::fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
