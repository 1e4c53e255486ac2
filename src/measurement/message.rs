//! ndt7 measurement messages sent as WebSocket text frames

use serde::Deserialize;

/// Kernel-level counters reported by the server
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TcpInfo {
    #[serde(default)]
    pub bytes_received: Option<f64>,
    /// Microseconds since the connection was established
    #[serde(default)]
    pub elapsed_time: Option<f64>,
}

impl TcpInfo {
    /// Upload rate seen by the server in megabits per second.
    ///
    /// Bytes per microsecond times eight is Mbit/s. A zero or missing
    /// elapsed time is treated as one microsecond.
    pub fn received_mbps(&self) -> Option<f64> {
        let bytes = self.bytes_received?;
        let elapsed = match self.elapsed_time {
            Some(us) if us > 0.0 => us,
            _ => 1.0,
        };
        Some(bytes / elapsed * 8.0)
    }
}

/// Application-level counters
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppInfo {
    pub elapsed_time: i64,
    pub num_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Measurement {
    #[serde(rename = "TCPInfo", default)]
    pub tcp_info: Option<TcpInfo>,
    #[serde(rename = "AppInfo", default)]
    pub app_info: Option<AppInfo>,
    #[serde(rename = "Origin", default)]
    pub origin: Option<String>,
    #[serde(rename = "Test", default)]
    pub test: Option<String>,
}

impl Measurement {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
