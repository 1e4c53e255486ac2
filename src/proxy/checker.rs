//! Health-checked proxy acquisition with bounded retries

use crate::account::Credential;
use crate::error::{Error, TransportError};
use crate::logger;
use crate::proxy::models::ProxyEndpoint;
use crate::proxy::pool::ProxyPool;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::Arc;
use std::time::Duration;

/// Default per-attempt proxy timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default number of acquisition attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default liveness check URL
const DEFAULT_CHECK_URL: &str = "https://api.ipify.org?format=json";

/// Unit of the linear backoff between failed checks
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Configuration for proxy acquisition
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Whether accounts are routed through proxies at all
    pub enabled: bool,
    /// Timeout applied to every request made through a proxy
    pub timeout: Duration,
    /// Attempts per acquisition
    pub max_retries: u32,
    /// URL fetched through the proxy to prove it is alive
    pub check_url: String,
    /// Backoff unit, attempt `n` waits `n * base_delay` after a failed check
    pub base_delay: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            check_url: DEFAULT_CHECK_URL.to_string(),
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_check_url(mut self, url: String) -> Self {
        self.check_url = url;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

/// HTTP client bound to one proxy endpoint
#[derive(Debug, Clone)]
pub struct Transport {
    endpoint: ProxyEndpoint,
    client: Client,
    timeout: Duration,
}

impl Transport {
    /// Build a reqwest client routed through `endpoint`
    pub fn connect(endpoint: &ProxyEndpoint, timeout: Duration) -> Result<Self> {
        // `all` so that https destinations (the liveness check, the API) go through
        // HTTP proxies as well
        let reqwest_proxy = ReqwestProxy::all(endpoint.url()).map_err(TransportError::Http)?;

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .timeout(timeout)
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self {
            endpoint: endpoint.clone(),
            client,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &ProxyEndpoint {
        &self.endpoint
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Builds transports and decides whether they are alive
#[async_trait]
pub trait ProxyConnector: Send + Sync {
    fn connect(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> Result<Transport>;

    async fn is_alive(&self, transport: &Transport, check_url: &str) -> bool;
}

/// Connector backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

#[async_trait]
impl ProxyConnector for HttpConnector {
    fn connect(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> Result<Transport> {
        Transport::connect(endpoint, timeout)
    }

    async fn is_alive(&self, transport: &Transport, check_url: &str) -> bool {
        match tokio::time::timeout(transport.timeout(), transport.client().get(check_url).send())
            .await
        {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(e)) => {
                tracing::debug!(proxy = %transport.endpoint(), error = %e, "liveness check failed");
                false
            }
            Err(_) => {
                tracing::debug!(proxy = %transport.endpoint(), "liveness check timed out");
                false
            }
        }
    }
}

/// Hands out live proxy transports per account
pub struct ProxyHealthChecker {
    config: CheckerConfig,
    pool: ProxyPool,
    connector: Arc<dyn ProxyConnector>,
}

impl ProxyHealthChecker {
    pub fn new(config: CheckerConfig, pool: ProxyPool) -> Self {
        Self::with_connector(config, pool, Arc::new(HttpConnector))
    }

    pub fn with_connector(
        config: CheckerConfig,
        pool: ProxyPool,
        connector: Arc<dyn ProxyConnector>,
    ) -> Self {
        Self {
            config,
            pool,
            connector,
        }
    }

    /// Checker that always yields direct connections
    pub fn disabled() -> Self {
        Self::new(CheckerConfig::default().with_enabled(false), ProxyPool::default())
    }

    /// Acquire a live transport using the configured retry budget
    pub async fn acquire(&mut self, account: &Credential) -> Result<Option<Transport>> {
        let retries = self.config.max_retries;
        self.acquire_with_retries(account, retries).await
    }

    /// Acquire a live transport for `account`.
    ///
    /// `Ok(None)` means "connect directly": proxies are disabled, the account
    /// has no group, or every check failed. A construction failure on the
    /// final attempt is an error.
    pub async fn acquire_with_retries(
        &mut self,
        account: &Credential,
        retries: u32,
    ) -> Result<Option<Transport>> {
        if !self.config.enabled {
            return Ok(None);
        }

        for attempt in 1..=retries {
            let Some(endpoint) = self.pool.next(account) else {
                return Ok(None);
            };

            let transport = match self.connector.connect(&endpoint, self.config.timeout) {
                Ok(transport) => transport,
                Err(e) => {
                    logger::error(format!(
                        "Proxy error ({}/{}) for {}: {}",
                        attempt, retries, endpoint, e
                    ));
                    if attempt == retries {
                        return Err(Error::ProxyExhausted { attempts: retries });
                    }
                    continue;
                }
            };

            if self.connector.is_alive(&transport, &self.config.check_url).await {
                logger::success(format!("Proxy connection established via {}", endpoint));
                return Ok(Some(transport));
            }

            logger::warning(format!(
                "Proxy check failed for {}, attempt {}/{}",
                endpoint, attempt, retries
            ));
            tokio::time::sleep(self.config.base_delay * attempt).await;
        }

        Ok(None)
    }
}
