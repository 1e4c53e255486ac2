//! Network throughput measurement against ndt7 servers
//!
//! A trial locates the nearest server, downloads for a fixed window, then
//! uploads for the same window. Either direction degrades to zero on failure.

pub mod locate;
pub mod message;
pub mod session;
pub mod speed;

pub use locate::{locate, MeasurementServer};
pub use message::{AppInfo, Measurement, TcpInfo};
pub use session::{MeasurementConfig, MeasurementSession, NDT7_SUBPROTOCOL};
pub use speed::{megabits_per_second, round2, SpeedResult};
