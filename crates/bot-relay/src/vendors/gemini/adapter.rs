use serde_json::Value;
use tracing::debug;

use crate::errors::{RelayError, UpstreamError};
use crate::normalizer::UpstreamProtocol;
use crate::upstream::{ByteStream, UpstreamAdapter, UpstreamId, UpstreamRequest};
use crate::vendors::{body_stream, send_with_timeout};

use super::config::GeminiConfig;

pub(crate) const GEMINI_UPSTREAM: &str = "gemini";

/// Result of a non-streaming generation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeminiReply {
    /// Text of the first part of the first candidate, empty if absent.
    pub text: String,
    /// Raw candidates as returned by the API.
    pub candidates: Value,
}

/// Adapter for Gemini `streamGenerateContent` (token-delta SSE).
pub struct GeminiAdapter {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiAdapter {
    pub fn new(config: GeminiConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config("GEMINI_API_KEY not configured".into()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build Gemini client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, RelayError> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// One-shot `generateContent` call for callers that asked for
    /// `stream: false`.
    pub async fn generate(&self, req: &UpstreamRequest) -> Result<GeminiReply, UpstreamError> {
        let upstream = self.id();
        let url = self
            .config
            .model_url(&req.target, false)
            .map_err(|message| UpstreamError::request(upstream.clone(), message, None))?;
        debug!(model = %req.target, message_id = %req.message_id, "Gemini generateContent");

        let request = self
            .client
            .post(url)
            .json(&build_request_body(&self.config, req));
        let response =
            send_with_timeout(&upstream, "Gemini", request, self.config.request_timeout).await?;
        let data: Value = response.json().await.map_err(|e| {
            UpstreamError::protocol(upstream.clone(), format!("invalid Gemini response: {e}"))
        })?;
        Ok(GeminiReply {
            text: data
                .pointer("/candidates/0/content/parts/0/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            candidates: data.get("candidates").cloned().unwrap_or(Value::Null),
        })
    }
}

#[async_trait::async_trait]
impl UpstreamAdapter for GeminiAdapter {
    fn id(&self) -> UpstreamId {
        UpstreamId::new(GEMINI_UPSTREAM)
    }

    fn protocol(&self) -> UpstreamProtocol {
        UpstreamProtocol::TokenDelta
    }

    async fn open_stream(&self, req: &UpstreamRequest) -> Result<ByteStream, UpstreamError> {
        let upstream = self.id();
        let url = self
            .config
            .model_url(&req.target, true)
            .map_err(|message| UpstreamError::request(upstream.clone(), message, None))?;
        debug!(model = %req.target, message_id = %req.message_id, "starting Gemini stream");

        let request = self
            .client
            .post(url)
            .json(&build_request_body(&self.config, req));
        let response =
            send_with_timeout(&upstream, "Gemini", request, self.config.request_timeout).await?;
        Ok(body_stream(upstream, response))
    }
}

/// Request body shared by both endpoints.
///
/// Object-valued `parameters` are merged over the configured
/// `generationConfig`, so a caller can override e.g. `temperature`.
pub(crate) fn build_request_body(config: &GeminiConfig, req: &UpstreamRequest) -> Value {
    let mut generation_config = serde_json::json!({
        "temperature": config.temperature,
        "maxOutputTokens": config.max_output_tokens,
    });
    if let (Some(Value::Object(overrides)), Some(target)) = (
        req.parameters.as_ref(),
        generation_config.as_object_mut(),
    ) {
        for (key, value) in overrides {
            target.insert(key.clone(), value.clone());
        }
    }

    let mut body = serde_json::json!({
        "contents": [{ "role": "user", "parts": [{ "text": req.message }] }],
        "generationConfig": generation_config,
    });
    if let Some(prompt) = config.system_prompt.as_deref() {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": prompt }] });
    }
    body
}
