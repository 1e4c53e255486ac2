//! Proxy endpoint models

use std::fmt;
use std::str::FromStr;

/// Proxy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Https => write!(f, "https"),
            ProxyScheme::Socks4 => write!(f, "socks4"),
            ProxyScheme::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            "socks4" => Ok(ProxyScheme::Socks4),
            "socks5" => Ok(ProxyScheme::Socks5),
            other => Err(format!("unsupported proxy scheme: {}", other)),
        }
    }
}

/// Proxy credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyAuth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

/// A single proxy endpoint, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
}

impl ProxyEndpoint {
    pub fn new(scheme: ProxyScheme, host: String, port: u16) -> Self {
        Self {
            scheme,
            host,
            port,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: String, password: String) -> Self {
        self.auth = Some(ProxyAuth::new(username, password));
        self
    }

    /// Full proxy URI including credentials
    pub fn url(&self) -> String {
        let auth_part = self.auth.as_ref().map_or(String::new(), |auth| {
            format!("{}:{}@", auth.username, auth.password)
        });

        format!("{}://{}{}:{}", self.scheme, auth_part, self.host, self.port)
    }

    /// Proxy URI safe for logs
    pub fn redacted(&self) -> String {
        let auth_part = if self.auth.is_some() { "***@" } else { "" };
        format!("{}://{}{}:{}", self.scheme, auth_part, self.host, self.port)
    }

    /// `host:port` of the proxy itself
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}
