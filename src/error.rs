//! Error types for the speed reporter

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing credential/proxy source, invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every acquisition attempt ended in a transport construction failure
    #[error("Proxy retries exhausted after {attempts} attempts")]
    ProxyExhausted { attempts: u32 },

    /// Expired, malformed or rejected credential
    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    /// No measurement server could be located
    #[error("Server discovery failed: {0}")]
    ServerDiscovery(String),

    /// Network or streaming failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Network-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Proxy tunnel failed: {0}")]
    Tunnel(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::Http(err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(TransportError::WebSocket(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(TransportError::Io(err))
    }
}

impl Error {
    /// Whether the failure should skip the account for the rest of the cycle
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, Error::TokenInvalid(_))
    }
}
