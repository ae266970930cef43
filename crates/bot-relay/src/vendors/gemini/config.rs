use std::time::Duration;

use crate::errors::RelayError;

/// Configuration for the Gemini generative language client.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key sent as the `key` query parameter.
    pub api_key: String,
    pub base_url: String,
    /// Upper bound on the wait for response headers.
    pub request_timeout: Duration,
    /// Optional system instruction sent with every request.
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            request_timeout: Duration::from_secs(120),
            system_prompt: None,
            temperature: 1.0,
            max_output_tokens: 65_536,
        }
    }

    /// Builds a config from `GEMINI_API_KEY` (and optional `GEMINI_BASE_URL`).
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RelayError::Config("GEMINI_API_KEY not configured".into()));
        }
        let config = Self::new(api_key);
        Ok(match std::env::var("GEMINI_BASE_URL") {
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

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// `{base}/v1beta/models/{model}:{method}?key=…`, plus `alt=sse` when
    /// streaming.
    pub(crate) fn model_url(&self, model: &str, streaming: bool) -> Result<reqwest::Url, String> {
        let method = if streaming {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let endpoint = format!("{model}:{method}");
        let mut url = reqwest::Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| format!("invalid Gemini base URL: {e}"))?;
        url.path_segments_mut()
            .map_err(|_| "Gemini base URL cannot carry a path".to_string())?
            .pop_if_empty()
            .extend(["v1beta", "models", endpoint.as_str()]);
        {
            let mut query = url.query_pairs_mut();
            if streaming {
                query.append_pair("alt", "sse");
            }
            query.append_pair("key", &self.api_key);
        }
        Ok(url)
    }
}
