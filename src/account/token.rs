//! Bearer credentials and local expiry checks

use crate::error::Error;
use crate::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// Seconds subtracted from `exp` before comparing against the clock
pub const EXPIRY_MARGIN_SECS: i64 = 90;

/// Opaque bearer credential identifying one account
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(Error::Configuration("empty credential".to_string()));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a credential list, ignoring blank and `#` lines and dropping
    /// duplicates while keeping the first occurrence
    pub fn parse_list(content: &str) -> Vec<Credential> {
        let mut seen = HashSet::new();
        let mut credentials = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !seen.insert(line.to_string()) {
                tracing::warn!("Skipping duplicate token entry");
                continue;
            }
            credentials.push(Credential(line.to_string()));
        }
        credentials
    }

    /// Load credentials from a file; a missing or empty file is fatal
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<Credential>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read token file {}: {}", path.display(), e))
        })?;
        let credentials = Self::parse_list(&content);
        if credentials.is_empty() {
            return Err(Error::Configuration(format!(
                "no valid tokens found in {}",
                path.display()
            )));
        }
        Ok(credentials)
    }

    /// Decode the JWT payload without verifying the signature
    pub fn claims(&self) -> Result<Claims> {
        let payload = self
            .0
            .split('.')
            .nth(1)
            .ok_or_else(|| Error::TokenInvalid("token is not a JWT".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::TokenInvalid(format!("undecodable payload: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::TokenInvalid(format!("malformed claims: {}", e)))
    }

    /// Reject the credential if it expires within the safety margin of `now`
    pub fn check_expiry(&self, now: DateTime<Utc>) -> Result<Claims> {
        let claims = self.claims()?;
        let cutoff_ms = (claims.exp - EXPIRY_MARGIN_SECS as f64) * 1000.0;
        if cutoff_ms < now.timestamp_millis() as f64 {
            return Err(Error::TokenInvalid("token expired".to_string()));
        }
        Ok(claims)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "{}…", prefix)
    }
}

/// Claims this client cares about
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// NumericDate; fractional seconds are allowed
    pub exp: f64,
}

#[cfg(test)]
pub(crate) fn make_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"42","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}
