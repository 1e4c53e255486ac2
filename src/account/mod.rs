//! Accounts and the reporting service
//!
//! Credentials are loaded and checked locally, then each account is run
//! through validation, a throughput trial and a points submission.

pub mod client;
pub mod geo;
pub mod processor;
pub mod token;

pub use client::{ApiClient, Profile, SpeedReport, SubmitResponse, DEFAULT_BASE_URL};
pub use geo::GeoLocation;
pub use processor::AccountProcessor;
pub use token::{Claims, Credential, EXPIRY_MARGIN_SECS};
