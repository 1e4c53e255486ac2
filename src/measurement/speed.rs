//! Throughput arithmetic for the download and upload phases

use crate::measurement::message::Measurement;
use std::time::Duration;

/// Download/upload estimate in megabits per second
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

impl SpeedResult {
    pub fn new(download_mbps: f64, upload_mbps: f64) -> Self {
        Self {
            download_mbps,
            upload_mbps,
        }
    }
}

/// `bytes * 8 / (seconds * 1e6)`, zero when no time has passed
pub fn megabits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (seconds * 1_000_000.0)
}

/// Round to two decimals for reporting
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Byte counter for the download phase
#[derive(Debug, Clone)]
pub struct DownloadMeter {
    measure_for: Duration,
    total_bytes: u64,
}

impl DownloadMeter {
    pub fn new(measure_for: Duration) -> Self {
        Self {
            measure_for,
            total_bytes: 0,
        }
    }

    /// Count a binary frame received `elapsed` after open; returns the
    /// final speed once the measuring window is over
    pub fn record(&mut self, len: usize, elapsed: Duration) -> Option<f64> {
        self.total_bytes += len as u64;
        if elapsed >= self.measure_for {
            Some(megabits_per_second(self.total_bytes, elapsed))
        } else {
            None
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// What the upload loop should do on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Window is over, close the connection
    Close,
    /// Queue another chunk
    Send,
    /// Outbound buffer is full, skip this tick
    Wait,
}

/// State of the upload phase
#[derive(Debug, Clone)]
pub struct UploadMeter {
    measure_for: Duration,
    buffer_limit: usize,
    bytes_sent: u64,
    server_mbps: f64,
}

impl UploadMeter {
    pub fn new(measure_for: Duration, buffer_limit: usize) -> Self {
        Self {
            measure_for,
            buffer_limit,
            bytes_sent: 0,
            server_mbps: 0.0,
        }
    }

    /// The close condition is checked before the buffer guard
    pub fn on_tick(&self, elapsed: Duration, buffered: usize) -> TickAction {
        if elapsed >= self.measure_for {
            TickAction::Close
        } else if buffered < self.buffer_limit {
            TickAction::Send
        } else {
            TickAction::Wait
        }
    }

    pub fn record_sent(&mut self, len: usize) {
        self.bytes_sent += len as u64;
    }

    /// Adopt the server-reported rate if it beats the current estimate
    pub fn observe(&mut self, measurement: &Measurement) -> bool {
        let Some(mbps) = measurement.tcp_info.as_ref().and_then(|t| t.received_mbps()) else {
            return false;
        };
        if mbps > self.server_mbps {
            self.server_mbps = mbps;
            true
        } else {
            false
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn server_mbps(&self) -> f64 {
        self.server_mbps
    }

    /// Server estimate when one was seen, otherwise the client-side rate
    pub fn finish(&self, elapsed: Duration) -> f64 {
        if self.server_mbps > 0.0 {
            self.server_mbps
        } else {
            megabits_per_second(self.bytes_sent, elapsed)
        }
    }
}
