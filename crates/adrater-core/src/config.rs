//! Client configuration
//!
//! Values come from the environment by default and can be overridden with the
//! builder-style setters.

use std::time::Duration;

/// Default service location when `ADRATER_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default bound for non-streaming calls. An analysis can take a minute, so
/// this leaves headroom.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Analysis service client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the analysis service, without trailing slash
    pub api_url: String,
    /// Timeout for request/response calls (health, analyze, get)
    pub request_timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let api_url =
            std::env::var("ADRATER_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let timeout_secs = std::env::var("ADRATER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        ClientConfig {
            api_url: normalize_base(&api_url),
            request_timeout: Duration::from_secs(timeout_secs),
            user_agent: format!("adrater/{}", crate::VERSION),
        }
    }
}

impl ClientConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific server
    pub fn new(api_url: &str) -> Self {
        ClientConfig {
            api_url: normalize_base(api_url),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("adrater/{}", crate::VERSION),
        }
    }

    /// Set the request/response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Absolute URL for an API path such as `/health`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
