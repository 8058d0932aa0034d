//! Fetcher configuration.

use std::time::Duration;

use serde::Deserialize;
use stowage_store::{ExtractLimits, ExtractLimitsOverrides};

/// Environment variable: request timeout in seconds (whole transfer).
pub const TIMEOUT_ENV: &str = "STOWAGE_FETCH_TIMEOUT";
/// Environment variable: connect timeout in seconds.
pub const CONNECT_TIMEOUT_ENV: &str = "STOWAGE_FETCH_CONNECT_TIMEOUT";
/// Environment variable: bearer token.
pub const TOKEN_ENV: &str = "STOWAGE_FETCH_TOKEN";

/// Configuration for [`RemoteBundleFetcher`](crate::RemoteBundleFetcher).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchConfig {
    /// Timeout for the whole request, body included, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,

    /// Extraction limit overrides on top of the store defaults.
    #[serde(default)]
    pub limits: ExtractLimitsOverrides,
}

fn default_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            token: None,
            limits: ExtractLimitsOverrides::default(),
        }
    }
}

impl FetchConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `STOWAGE_FETCH_TIMEOUT` | Request timeout in seconds (default: 300) |
    /// | `STOWAGE_FETCH_CONNECT_TIMEOUT` | Connect timeout in seconds (default: 10) |
    /// | `STOWAGE_FETCH_TOKEN` | Bearer token |
    ///
    /// Unparseable numbers fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            timeout_secs: env_secs(TIMEOUT_ENV).unwrap_or_else(default_timeout),
            connect_timeout_secs: env_secs(CONNECT_TIMEOUT_ENV)
                .unwrap_or_else(default_connect_timeout),
            token: std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()),
            limits: ExtractLimitsOverrides::default(),
        }
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_limits(mut self, limits: ExtractLimitsOverrides) -> Self {
        self.limits = limits;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Effective extraction limits.
    pub fn extract_limits(&self) -> ExtractLimits {
        ExtractLimits::default().apply(self.limits.clone())
    }
}

fn env_secs(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
