use std::time::Duration;

use crate::errors::RelayError;

/// Configuration for the Poe bot protocol client.
#[derive(Clone, Debug)]
pub struct PoeConfig {
    /// API key sent as bearer token.
    pub api_key: String,
    /// Base URL of the bot API.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Upper bound on the wait for response headers.
    pub request_timeout: Duration,
}

impl PoeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.poe.com".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Builds a config from `POE_API_KEY` (and optional `POE_BASE_URL`).
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = std::env::var("POE_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RelayError::Config("POE_API_KEY not configured".into()));
        }
        let config = Self::new(api_key);
        Ok(match std::env::var("POE_BASE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => config.base_url(base_url),
            _ => config,
        })
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// `{base}/bot/{bot_name}` with the bot name encoded as one path segment.
    pub(crate) fn bot_url(&self, bot_name: &str) -> Result<reqwest::Url, String> {
        let mut url = reqwest::Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| format!("invalid Poe base URL: {e}"))?;
        url.path_segments_mut()
            .map_err(|_| "Poe base URL cannot carry a path".to_string())?
            .pop_if_empty()
            .push("bot")
            .push(bot_name);
        Ok(url)
    }
}
