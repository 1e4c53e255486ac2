//! Per-account pipeline: validate, measure, report

use crate::account::client::{ApiClient, SpeedReport, SubmitResponse};
use crate::account::geo::GeoLocation;
use crate::account::token::Credential;
use crate::logger;
use crate::measurement::{MeasurementSession, SpeedResult};
use crate::proxy::ProxyHealthChecker;
use crate::Result;
use chrono::{Local, Utc};

/// Runs one account through validation, measurement and submission.
///
/// Every outbound operation acquires its own transport, so each request
/// advances the account's proxy rotation.
pub struct AccountProcessor {
    api: ApiClient,
    proxies: ProxyHealthChecker,
    session: MeasurementSession,
}

impl AccountProcessor {
    pub fn new(api: ApiClient, proxies: ProxyHealthChecker, session: MeasurementSession) -> Self {
        Self {
            api,
            proxies,
            session,
        }
    }

    /// Process account `index` (zero-based); failures are logged and
    /// reported as `false`
    pub async fn process(&mut self, index: usize, credential: &Credential) -> bool {
        let number = index + 1;
        logger::info(format!("=== Processing Account {} ===", number));
        logger::time(format!("Time: {}", Local::now().format("%Y-%m-%d %H:%M:%S")));

        if let Err(e) = self.validate(credential).await {
            logger::error(format!("Token validation failed: {}", e));
            logger::error(format!("Token {} is invalid or expired", number));
            return false;
        }
        logger::success(format!("Token {} validation successful", number));

        self.show_profile(credential).await;

        let location = GeoLocation::random();
        logger::location(format!("Speed test location: {}", location));

        logger::network("Starting speed test...");
        let speed = self.measure(credential).await;
        logger::speed(format!("Final Download speed: {:.2} Mbps", speed.download_mbps));
        logger::speed(format!("Final Upload speed: {:.2} Mbps", speed.upload_mbps));

        logger::info("Submitting test results...");
        match self.report(credential, speed, location).await {
            Ok(response) if response.success => {
                logger::success("Speed test completed and results reported");
                true
            }
            Ok(response) => {
                logger::error("Failed to report results");
                logger::error(format!(
                    "Failure reason: {}",
                    response.message.as_deref().unwrap_or("Report failed")
                ));
                false
            }
            Err(e) => {
                logger::error(format!("Error submitting results: {}", e));
                false
            }
        }
    }

    async fn validate(&mut self, credential: &Credential) -> Result<()> {
        credential.check_expiry(Utc::now())?;
        let transport = self.proxies.acquire(credential).await?;
        self.api.validate(credential, transport.as_ref()).await
    }

    /// Best-effort; failures only skip the display
    async fn show_profile(&mut self, credential: &Credential) {
        let profile = match self.proxies.acquire(credential).await {
            Ok(transport) => self.api.fetch_profile(credential, transport.as_ref()).await,
            Err(e) => Err(e),
        };
        match profile {
            Ok(profile) => {
                logger::info("=== Account Information ===");
                logger::info(format!(
                    "Username: {}",
                    profile.username.as_deref().unwrap_or("Not set")
                ));
                logger::info(format!(
                    "Email: {}",
                    profile.email.as_deref().unwrap_or("Not set")
                ));
            }
            Err(e) => logger::error(format!("Failed to get account information: {}", e)),
        }
    }

    async fn measure(&mut self, credential: &Credential) -> SpeedResult {
        match self.proxies.acquire(credential).await {
            Ok(transport) => self.session.run(transport.as_ref()).await,
            Err(e) => {
                logger::error(format!("Speed test error: {}", e));
                SpeedResult::default()
            }
        }
    }

    async fn report(
        &mut self,
        credential: &Credential,
        speed: SpeedResult,
        location: GeoLocation,
    ) -> Result<SubmitResponse> {
        let transport = self.proxies.acquire(credential).await?;
        let report = SpeedReport::new(speed, location, Utc::now());
        self.api.submit(credential, &report, transport.as_ref()).await
    }
}
