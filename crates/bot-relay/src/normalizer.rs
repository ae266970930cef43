//! Maps decoded frames from either upstream protocol onto cumulative
//! [`ProgressEvent`]s.

use serde_json::Value;
use tracing::{debug, warn};

use crate::decoder::{Frame, Framing};
use crate::event::{Attachment, ProgressEvent};

/// Wire protocol spoken by an upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamProtocol {
    /// Untyped `data:` lines, each carrying a JSON object with a text delta
    /// at `candidates[0].content.parts[0].text`. The upstream just closes
    /// the connection when done.
    TokenDelta,
    /// `event:`/`data:` pairs: `text`, `replace_response`, `meta`, `done`,
    /// `error`.
    BotEvents,
}

impl UpstreamProtocol {
    /// Framing the decoder must use for this protocol.
    pub fn framing(self) -> Framing {
        match self {
            Self::TokenDelta => Framing::Lines,
            // Poe sends every `data:` on one line right after its tag, and
            // the tag must survive a blank line between the two.
            Self::BotEvents => Framing::Lines,
        }
    }
}

const TOKEN_DELTA_TEXT: &str = "/candidates/0/content/parts/0/text";

/// Per-exchange accumulation state.
///
/// One normalizer exists per exchange and is never shared; it holds the
/// cumulative content, the attachments from the last `meta` frame, and
/// whether a terminal event was already produced.
#[derive(Debug)]
pub struct Normalizer {
    protocol: UpstreamProtocol,
    message_id: String,
    sender_id: String,
    content: String,
    attachments: Vec<Attachment>,
    frames_seen: usize,
    terminated: bool,
}

impl Normalizer {
    pub fn new(
        protocol: UpstreamProtocol,
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            message_id: message_id.into(),
            sender_id: sender_id.into(),
            content: String::new(),
            attachments: Vec::new(),
            frames_seen: 0,
            terminated: false,
        }
    }

    pub fn protocol(&self) -> UpstreamProtocol {
        self.protocol
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Cumulative content so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of frames that parsed as JSON.
    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Maps one frame to at most one event.
    ///
    /// Payloads that are not valid JSON are dropped without touching state.
    /// Frames arriving after a terminal event are ignored.
    pub fn on_frame(&mut self, frame: &Frame) -> Option<ProgressEvent> {
        if self.terminated {
            return None;
        }
        let value: Value = match serde_json::from_str(&frame.data) {
            Ok(value) => value,
            Err(err) => {
                warn!(message_id = %self.message_id, event = ?frame.event, error = %err, "dropping malformed upstream frame");
                return None;
            }
        };
        self.frames_seen += 1;
        let event = match self.protocol {
            UpstreamProtocol::TokenDelta => self.on_token_delta(&value),
            UpstreamProtocol::BotEvents => self.on_bot_event(frame.event.as_deref(), &value),
        };
        if let Some(event) = &event {
            debug!(message_id = %self.message_id, status = %event.status, content_len = event.content.len(), "normalized upstream frame");
            if event.is_terminal() {
                self.terminated = true;
            }
        }
        event
    }

    /// Terminal event for an upstream that closed without `done`/`error`.
    ///
    /// Returns `None` if a terminal event was already produced, or if the
    /// upstream sent neither content nor a single parseable frame.
    pub fn close(&mut self) -> Option<ProgressEvent> {
        if self.terminated || (self.content.is_empty() && self.frames_seen == 0) {
            return None;
        }
        self.terminated = true;
        Some(self.snapshot_complete())
    }

    /// Terminal error for a failure after streaming began. Content produced
    /// so far is preserved.
    pub fn fail(&mut self, status_text: impl Into<String>) -> Option<ProgressEvent> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        Some(ProgressEvent::error(
            &self.message_id,
            &self.sender_id,
            &self.content,
            self.attachments.clone(),
            status_text,
        ))
    }

    fn on_token_delta(&mut self, value: &Value) -> Option<ProgressEvent> {
        let delta = value
            .pointer(TOKEN_DELTA_TEXT)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())?;
        self.content.push_str(delta);
        Some(self.snapshot_incomplete())
    }

    fn on_bot_event(&mut self, tag: Option<&str>, value: &Value) -> Option<ProgressEvent> {
        let text = value.get("text");
        match tag {
            Some("text") => {
                self.content.push_str(text.and_then(Value::as_str).unwrap_or_default());
                Some(self.snapshot_incomplete())
            }
            None if text.is_some_and(|t| !t.is_null()) => {
                self.content.push_str(text.and_then(Value::as_str).unwrap_or_default());
                Some(self.snapshot_incomplete())
            }
            Some("replace_response") => {
                self.content = text.and_then(Value::as_str).unwrap_or_default().to_string();
                Some(self.snapshot_incomplete())
            }
            Some("done") => Some(self.snapshot_complete()),
            Some("error") => {
                let status_text = non_empty_str(value, "text")
                    .or_else(|| non_empty_str(value, "message"))
                    .unwrap_or("Unknown error");
                Some(ProgressEvent::error(
                    &self.message_id,
                    &self.sender_id,
                    &self.content,
                    self.attachments.clone(),
                    status_text,
                ))
            }
            Some("meta") => {
                if let Some(list) = value.get("attachments").filter(|v| !v.is_null()) {
                    match serde_json::from_value::<Vec<Attachment>>(list.clone()) {
                        Ok(attachments) => self.attachments = attachments,
                        Err(err) => {
                            warn!(message_id = %self.message_id, error = %err, "ignoring malformed meta attachments")
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn snapshot_incomplete(&self) -> ProgressEvent {
        ProgressEvent::incomplete(
            &self.message_id,
            &self.sender_id,
            &self.content,
            self.attachments.clone(),
        )
    }

    fn snapshot_complete(&self) -> ProgressEvent {
        ProgressEvent::complete(
            &self.message_id,
            &self.sender_id,
            &self.content,
            self.attachments.clone(),
        )
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
