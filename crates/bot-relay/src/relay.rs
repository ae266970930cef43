//! Server-side sink: opens an exchange against a registered upstream and
//! re-emits its progress events as SSE.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;

use futures::StreamExt as _;
use tracing::{info, warn};

use crate::errors::{RelayError, UpstreamError};
use crate::event::ProgressEvent;
use crate::exchange::{ExchangeIds, ExchangeStream, progress_events};
use crate::normalizer::Normalizer;
use crate::upstream::{UpstreamAdapter, UpstreamId, UpstreamRequest};

/// Request accepted by the relay endpoints.
///
/// The target is read from `botName` (bot protocol) or `model` (token
/// protocol).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    #[serde(default, alias = "botName", alias = "model")]
    pub target: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

fn default_stream() -> bool {
    true
}

impl InboundRequest {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
            stream: true,
            conversation_id: None,
            parameters: None,
        }
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Rejects requests that must never reach an upstream.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.target.trim().is_empty() || self.message.trim().is_empty() {
            return Err(RelayError::Input("Missing target or message".into()));
        }
        Ok(())
    }
}

/// Registry of upstream adapters plus the exchange entry point.
#[derive(Clone)]
pub struct Relay {
    upstreams: Arc<HashMap<UpstreamId, Arc<dyn UpstreamAdapter>>>,
}

impl Relay {
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    pub fn upstream(&self, id: &UpstreamId) -> Option<Arc<dyn UpstreamAdapter>> {
        self.upstreams.get(id).cloned()
    }

    pub fn has_upstream(&self, id: &UpstreamId) -> bool {
        self.upstreams.contains_key(id)
    }

    /// Opens one exchange.
    ///
    /// Returns `Err` for invalid input, an unknown upstream, or an upstream
    /// that failed before producing its first event. Once this returns `Ok`,
    /// every later failure is delivered in-band as an `error` event.
    pub async fn open(
        &self,
        upstream_id: &UpstreamId,
        inbound: InboundRequest,
    ) -> Result<ExchangeStream, RelayError> {
        inbound.validate()?;
        let upstream = self
            .upstream(upstream_id)
            .ok_or_else(|| RelayError::UpstreamNotFound {
                upstream: upstream_id.clone(),
            })?;

        let ids = ExchangeIds::generate(inbound.conversation_id);
        let request = UpstreamRequest {
            target: inbound.target,
            message: inbound.message,
            conversation_id: ids.conversation_id.clone(),
            message_id: ids.message_id.clone(),
            parameters: inbound.parameters,
        };
        info!(upstream = %upstream_id, target = %request.target, message_id = %ids.message_id, conversation_id = %ids.conversation_id, "opening exchange");

        let body = upstream.open_stream(&request).await?;
        let normalizer = Normalizer::new(upstream.protocol(), &ids.message_id, &request.target);
        let mut events = progress_events(upstream_id.clone(), normalizer, body).boxed();

        match events.next().await {
            Some(Ok(first)) => Ok(ExchangeStream::new(ids, request.target, first, events)),
            Some(Err(err)) => Err(err.into()),
            None => Err(UpstreamError::protocol(
                upstream_id.clone(),
                "upstream stream ended before any event",
            )
            .into()),
        }
    }
}

/// Builder used to register upstream adapters before creating a `Relay`.
#[derive(Default)]
pub struct RelayBuilder {
    upstreams: Vec<Arc<dyn UpstreamAdapter>>,
}

impl RelayBuilder {
    /// Registers an adapter. Ids must be unique.
    pub fn register_upstream(mut self, upstream: Arc<dyn UpstreamAdapter>) -> Self {
        self.upstreams.push(upstream);
        self
    }

    pub fn build(self) -> Result<Relay, RelayError> {
        let mut map: HashMap<UpstreamId, Arc<dyn UpstreamAdapter>> = HashMap::new();
        let mut seen: HashSet<UpstreamId> = HashSet::new();
        for upstream in self.upstreams {
            let id = upstream.id();
            if !seen.insert(id.clone()) {
                return Err(RelayError::Config(format!(
                    "duplicate upstream registration: {id}"
                )));
            }
            map.insert(id, upstream);
        }
        Ok(Relay {
            upstreams: Arc::new(map),
        })
    }
}

/// Serializes every event as one `data: <json>\n\n` chunk, in order, one
/// chunk per event. The stream ends after the terminal event.
pub fn sse_body(
    exchange: ExchangeStream,
) -> impl futures::Stream<Item = Result<bytes::Bytes, Infallible>> + Send {
    let message_id = exchange.message_id().to_string();
    exchange.into_stream().filter_map(move |event| {
        let frame = encode_frame(&message_id, &event);
        async move { frame.map(Ok) }
    })
}

fn encode_frame(message_id: &str, event: &ProgressEvent) -> Option<bytes::Bytes> {
    match event.to_sse_frame() {
        Ok(frame) => Some(bytes::Bytes::from(frame)),
        Err(err) => {
            warn!(message_id, error = %err, "failed to encode progress event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Status;
    use crate::normalizer::UpstreamProtocol;
    use crate::upstream::ByteStream;
    use futures::stream;
    use std::sync::Mutex;

    struct FakeUpstream {
        id: &'static str,
        behavior: FakeBehavior,
        seen: Mutex<Vec<UpstreamRequest>>,
    }

    enum FakeBehavior {
        RequestError(UpstreamError),
        Body(Vec<Result<&'static [u8], UpstreamError>>),
    }

    impl FakeUpstream {
        fn new(behavior: FakeBehavior) -> Self {
            Self {
                id: "fake",
                behavior,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl UpstreamAdapter for FakeUpstream {
        fn id(&self) -> UpstreamId {
            UpstreamId::new(self.id)
        }

        fn protocol(&self) -> UpstreamProtocol {
            UpstreamProtocol::BotEvents
        }

        async fn open_stream(&self, req: &UpstreamRequest) -> Result<ByteStream, UpstreamError> {
            self.seen.lock().expect("lock").push(req.clone());
            match &self.behavior {
                FakeBehavior::RequestError(err) => Err(err.clone()),
                FakeBehavior::Body(parts) => {
                    let parts: Vec<_> = parts
                        .iter()
                        .map(|p| p.clone().map(bytes::Bytes::from_static))
                        .collect();
                    Ok(Box::pin(stream::iter(parts)))
                }
            }
        }
    }

    fn relay_with(upstream: Arc<FakeUpstream>) -> Relay {
        Relay::builder()
            .register_upstream(upstream)
            .build()
            .expect("relay")
    }

    async fn sse_text(exchange: ExchangeStream) -> String {
        let chunks: Vec<_> = sse_body(exchange).collect().await;
        chunks
            .into_iter()
            .map(|c| String::from_utf8(c.expect("infallible").to_vec()).expect("utf8"))
            .collect()
    }

    #[tokio::test]
    async fn relays_cumulative_events_as_sse_frames() {
        let upstream = Arc::new(FakeUpstream::new(FakeBehavior::Body(vec![
            Ok(b"event: text\ndata: {\"text\":\"Hel\"}\n\nevent: te".as_slice()),
            Ok(b"xt\ndata: {\"text\":\"lo\"}\n\nevent: done\ndata: {}\n\n".as_slice()),
        ])));
        let relay = relay_with(upstream.clone());
        let exchange = relay
            .open(&UpstreamId::new("fake"), InboundRequest::new("Helper-Bot", "hi"))
            .await
            .expect("open");
        let message_id = exchange.message_id().to_string();
        let body = sse_text(exchange).await;

        let frames: Vec<&str> = body.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 3);
        let events: Vec<ProgressEvent> = frames
            .iter()
            .map(|f| serde_json::from_str(f.strip_prefix("data: ").expect("data prefix")).expect("json"))
            .collect();
        assert_eq!(events[0].content, "Hel");
        assert_eq!(events[1].content, "Hello");
        assert_eq!(events[2].status, Status::Complete);
        assert!(events.iter().all(|e| e.message_id == message_id && e.sender_id == "Helper-Bot"));

        let seen = upstream.seen.lock().expect("lock");
        assert_eq!(seen[0].message_id, message_id);
        assert!(seen[0].conversation_id.starts_with("conv-"));
    }

    #[tokio::test]
    async fn request_failure_is_returned_before_streaming() {
        let upstream = Arc::new(FakeUpstream::new(FakeBehavior::RequestError(
            UpstreamError::request("fake", "Poe API 401: bad key", Some(401)),
        )));
        let err = relay_with(upstream)
            .open(&UpstreamId::new("fake"), InboundRequest::new("bot", "hi"))
            .await
            .err()
            .expect("request error");
        assert_eq!(err.http_status(), 401);
    }

    #[tokio::test]
    async fn empty_upstream_is_a_plain_error() {
        let upstream = Arc::new(FakeUpstream::new(FakeBehavior::Body(vec![])));
        let err = relay_with(upstream)
            .open(&UpstreamId::new("fake"), InboundRequest::new("bot", "hi"))
            .await
            .err()
            .expect("no frames");
        assert!(matches!(err, RelayError::Upstream(UpstreamError::Protocol { .. })));
    }

    #[tokio::test]
    async fn mid_stream_failure_becomes_error_frame() {
        let upstream = Arc::new(FakeUpstream::new(FakeBehavior::Body(vec![
            Ok(b"event: text\ndata: {\"text\":\"part\"}\n\n".as_slice()),
            Err(UpstreamError::stream("fake", "eof")),
        ])));
        let exchange = relay_with(upstream)
            .open(&UpstreamId::new("fake"), InboundRequest::new("bot", "hi"))
            .await
            .expect("open");
        let events = exchange.collect_events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, Status::Error);
        assert_eq!(events[1].content, "part");
    }

    #[tokio::test]
    async fn input_and_registry_errors() {
        let relay = relay_with(Arc::new(FakeUpstream::new(FakeBehavior::Body(vec![]))));
        let err = relay
            .open(&UpstreamId::new("fake"), InboundRequest::new("", "hi"))
            .await
            .err()
            .expect("missing target");
        assert!(matches!(err, RelayError::Input(_)));

        let err = relay
            .open(&UpstreamId::new("other"), InboundRequest::new("bot", "hi"))
            .await
            .err()
            .expect("unknown upstream");
        assert!(matches!(err, RelayError::UpstreamNotFound { .. }));

        let dup = Relay::builder()
            .register_upstream(Arc::new(FakeUpstream::new(FakeBehavior::Body(vec![]))))
            .register_upstream(Arc::new(FakeUpstream::new(FakeBehavior::Body(vec![]))))
            .build();
        assert!(matches!(dup, Err(RelayError::Config(msg)) if msg.contains("duplicate upstream")));
    }

    #[test]
    fn inbound_request_accepts_bot_name_or_model() {
        let poe: InboundRequest = serde_json::from_value(serde_json::json!({
            "botName": "Helper-Bot", "message": "hi", "conversationId": "conv-1"
        }))
        .expect("poe body");
        assert_eq!(poe.target, "Helper-Bot");
        assert!(poe.stream);
        assert_eq!(poe.conversation_id.as_deref(), Some("conv-1"));

        let gemini: InboundRequest = serde_json::from_value(serde_json::json!({
            "model": "gemini-2.5-flash", "message": "hi", "stream": false
        }))
        .expect("gemini body");
        assert_eq!(gemini.target, "gemini-2.5-flash");
        assert!(!gemini.stream);
    }
}
