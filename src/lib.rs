//! Speed Rotator - multi-account network speed reporter
//!
//! Measures throughput against ndt7 servers on behalf of several accounts,
//! routing each account through its own rotating group of proxies, and
//! submits the results to a reporting service on a fixed schedule.

pub mod account;
pub mod config;
pub mod error;
pub mod logger;
pub mod measurement;
pub mod prompt;
pub mod proxy;
pub mod scheduler;

pub use account::{AccountProcessor, ApiClient, Credential, GeoLocation};
pub use config::AppConfig;
pub use error::{Error, TransportError};
pub use measurement::{MeasurementConfig, MeasurementSession, SpeedResult};
pub use proxy::*;
pub use scheduler::{CycleScheduler, CycleSummary};

/// Library result type
pub type Result<T> = std::result::Result<T, Error>;
