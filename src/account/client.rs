//! Reporting service API

use crate::account::geo::GeoLocation;
use crate::account::token::Credential;
use crate::error::{Error, TransportError};
use crate::measurement::{round2, SpeedResult};
use crate::proxy::Transport;
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://app.despeed.net";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36 Edg/129.0.0.0";

/// Account profile as returned by the service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    #[serde(default)]
    data: Profile,
}

/// Body of a points submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedReport {
    pub download_speed: f64,
    pub upload_speed: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

impl SpeedReport {
    pub fn new(speed: SpeedResult, location: GeoLocation, at: DateTime<Utc>) -> Self {
        Self {
            download_speed: round2(speed.download_mbps),
            upload_speed: round2(speed.upload_mbps),
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client for the profile and points endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    origin: String,
    client: Client,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            origin: base_url.clone(),
            base_url,
            client,
            timeout,
        })
    }

    fn http<'a>(&'a self, transport: Option<&'a Transport>) -> &'a Client {
        transport.map_or(&self.client, Transport::client)
    }

    fn headers(&self, credential: &Credential) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credential.as_str()))
            .map_err(|_| Error::TokenInvalid("token contains invalid characters".to_string()))?;
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        if let Ok(origin) = HeaderValue::from_str(&self.origin) {
            headers.insert(header::ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/dashboard", self.origin)) {
            headers.insert(header::REFERER, referer);
        }
        Ok(headers)
    }

    /// Confirm the service accepts `credential`; any non-success status
    /// marks it invalid
    pub async fn validate(&self, credential: &Credential, transport: Option<&Transport>) -> Result<()> {
        self.profile_request(credential, transport).await.map(|_| ())
    }

    pub async fn fetch_profile(
        &self,
        credential: &Credential,
        transport: Option<&Transport>,
    ) -> Result<Profile> {
        let response = self.profile_request(credential, transport).await?;
        let envelope: ProfileEnvelope = response.json().await?;
        Ok(envelope.data)
    }

    async fn profile_request(
        &self,
        credential: &Credential,
        transport: Option<&Transport>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/v1/api/auth/profile", self.base_url);
        let response = self
            .http(transport)
            .get(&url)
            .headers(self.headers(credential)?)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::TokenInvalid(format!(
                "profile request returned {}",
                response.status().as_u16()
            )));
        }
        Ok(response)
    }

    /// Post a report; a non-success status is an error, the `success` flag
    /// is left to the caller
    pub async fn submit(
        &self,
        credential: &Credential,
        report: &SpeedReport,
        transport: Option<&Transport>,
    ) -> Result<SubmitResponse> {
        let url = format!("{}/v1/api/points", self.base_url);
        let response = self
            .http(transport)
            .post(&url)
            .headers(self.headers(credential)?)
            .json(report)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()).into());
        }
        Ok(response.json().await?)
    }
}
