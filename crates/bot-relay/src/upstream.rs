use std::fmt;
use std::pin::Pin;

use crate::errors::UpstreamError;
use crate::normalizer::UpstreamProtocol;

/// Raw response body of an upstream, already mapped to upstream errors.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, UpstreamError>> + Send + 'static>>;

/// Stable identifier for an upstream adapter (for example `poe`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UpstreamId(pub String);

impl UpstreamId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UpstreamId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UpstreamId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Minimal request shape handed to an upstream adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamRequest {
    /// Bot name or model the message is addressed to.
    pub target: String,
    pub message: String,
    pub conversation_id: String,
    pub message_id: String,
    /// Free-form caller parameters, forwarded only by adapters that use them.
    pub parameters: Option<serde_json::Value>,
}

/// Contract implemented by every upstream integration.
///
/// `open_stream` resolves once response headers arrived with a success
/// status; every failure up to that point is an `UpstreamError::Request`.
/// Failures while reading the returned body are `UpstreamError::Stream`.
#[async_trait::async_trait]
pub trait UpstreamAdapter: Send + Sync {
    fn id(&self) -> UpstreamId;

    /// Protocol spoken by the streaming endpoint.
    fn protocol(&self) -> UpstreamProtocol;

    async fn open_stream(&self, req: &UpstreamRequest) -> Result<ByteStream, UpstreamError>;
}
