//! Application configuration

use crate::account::DEFAULT_BASE_URL;
use crate::error::Error;
use crate::measurement::MeasurementConfig;
use crate::proxy::{CheckerConfig, DistributionMode};
use crate::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Everything the scheduler needs to run
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Credential list, one token per line
    pub tokens_path: PathBuf,
    /// Proxy list, one endpoint per line
    pub proxies_path: PathBuf,
    pub distribution: DistributionMode,
    /// Reporting service root
    pub base_url: String,
    /// Pause between the end of one cycle and the start of the next
    pub check_interval: Duration,
    /// Pause between consecutive accounts within a cycle
    pub account_delay: Duration,
    /// Timeout for reporting service requests
    pub request_timeout: Duration,
    pub checker: CheckerConfig,
    pub measurement: MeasurementConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tokens_path: PathBuf::from("token.txt"),
            proxies_path: PathBuf::from("proxy.txt"),
            distribution: DistributionMode::Even,
            base_url: DEFAULT_BASE_URL.to_string(),
            check_interval: Duration::from_secs(60),
            account_delay: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            checker: CheckerConfig::default(),
            measurement: MeasurementConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens_path(mut self, path: PathBuf) -> Self {
        self.tokens_path = path;
        self
    }

    pub fn with_proxies_path(mut self, path: PathBuf) -> Self {
        self.proxies_path = path;
        self
    }

    pub fn with_distribution(mut self, mode: DistributionMode) -> Self {
        self.distribution = mode;
        self
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_check_interval_minutes(mut self, minutes: u64) -> Self {
        self.check_interval = Duration::from_secs(minutes * 60);
        self
    }

    pub fn with_account_delay(mut self, delay: Duration) -> Self {
        self.account_delay = delay;
        self
    }

    pub fn with_checker(mut self, checker: CheckerConfig) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_measurement(mut self, measurement: MeasurementConfig) -> Self {
        self.measurement = measurement;
        self
    }

    /// Whole minutes between cycles
    pub fn check_interval_minutes(&self) -> u64 {
        self.check_interval.as_secs() / 60
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval < Duration::from_secs(60) {
            return Err(Error::Configuration(
                "check interval must be at least one minute".to_string(),
            ));
        }
        if self.checker.max_retries == 0 {
            return Err(Error::Configuration("max retries must be at least 1".to_string()));
        }
        if self.checker.timeout.is_zero() {
            return Err(Error::Configuration("proxy timeout must be positive".to_string()));
        }
        Url::parse(&self.base_url).map_err(|e| {
            Error::Configuration(format!("invalid base url {}: {}", self.base_url, e))
        })?;
        Ok(())
    }

    /// Settings view safe to print
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            tokens_path: self.tokens_path.display().to_string(),
            proxies_path: self.proxies_path.display().to_string(),
            base_url: self.base_url.clone(),
            check_interval_minutes: self.check_interval_minutes(),
            account_delay_secs: self.account_delay.as_secs(),
            distribution: self.distribution.to_string(),
            proxy_enabled: self.checker.enabled,
            proxy_timeout_ms: self.checker.timeout.as_millis() as u64,
            max_retries: self.checker.max_retries,
        }
    }
}

/// Printable subset of [`AppConfig`]; credentials never appear here
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub tokens_path: String,
    pub proxies_path: String,
    pub base_url: String,
    pub check_interval_minutes: u64,
    pub account_delay_secs: u64,
    pub distribution: String,
    pub proxy_enabled: bool,
    pub proxy_timeout_ms: u64,
    pub max_retries: u32,
}
