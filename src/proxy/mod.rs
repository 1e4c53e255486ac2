//! Proxy handling
//!
//! This module provides functionality for:
//! - Parsing and normalizing proxy lists (HOST:PORT, scheme URLs, credentials)
//! - Partitioning proxies into disjoint per-account groups with round-robin rotation
//! - Acquiring health-checked transports with linear backoff
//! - Opening raw TCP tunnels through HTTP CONNECT and SOCKS proxies

pub mod checker;
pub mod models;
pub mod parser;
pub mod pool;
pub mod tunnel;

pub use checker::{CheckerConfig, HttpConnector, ProxyConnector, ProxyHealthChecker, Transport};
pub use models::{ProxyAuth, ProxyEndpoint, ProxyScheme};
pub use parser::ProxyParser;
pub use pool::{AllocationSource, DistributionMode, NoAllocation, ProxyPool, Rejection};
