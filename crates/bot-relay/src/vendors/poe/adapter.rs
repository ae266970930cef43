use tracing::debug;

use crate::errors::{RelayError, UpstreamError};
use crate::event::DEFAULT_CONTENT_TYPE;
use crate::normalizer::UpstreamProtocol;
use crate::upstream::{ByteStream, UpstreamAdapter, UpstreamId, UpstreamRequest};
use crate::vendors::{body_stream, send_with_timeout};

use super::config::PoeConfig;

pub(crate) const POE_UPSTREAM: &str = "poe";
const PROTOCOL_VERSION: &str = "1.0";

/// Adapter for the Poe bot query protocol (typed `event:`/`data:` stream).
pub struct PoeAdapter {
    client: reqwest::Client,
    config: PoeConfig,
}

impl PoeAdapter {
    pub fn new(config: PoeConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config("POE_API_KEY not configured".into()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build Poe client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, RelayError> {
        Self::new(PoeConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl UpstreamAdapter for PoeAdapter {
    fn id(&self) -> UpstreamId {
        UpstreamId::new(POE_UPSTREAM)
    }

    fn protocol(&self) -> UpstreamProtocol {
        UpstreamProtocol::BotEvents
    }

    async fn open_stream(&self, req: &UpstreamRequest) -> Result<ByteStream, UpstreamError> {
        let upstream = self.id();
        let url = self
            .config
            .bot_url(&req.target)
            .map_err(|message| UpstreamError::request(upstream.clone(), message, None))?;
        debug!(bot = %req.target, message_id = %req.message_id, conversation_id = %req.conversation_id, "starting Poe bot query");

        let request = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&build_query_body(req));
        let response =
            send_with_timeout(&upstream, "Poe API", request, self.config.request_timeout).await?;
        Ok(body_stream(upstream, response))
    }
}

/// Query body of the bot protocol: one user message, no prior history.
pub(crate) fn build_query_body(req: &UpstreamRequest) -> serde_json::Value {
    serde_json::json!({
        "version": PROTOCOL_VERSION,
        "type": "query",
        "query": [{
            "role": "user",
            "content": req.message,
            "content_type": DEFAULT_CONTENT_TYPE,
            "attachments": [],
        }],
        "user_id": "",
        "conversation_id": req.conversation_id,
        "message_id": req.message_id,
    })
}
