use serde::{Deserialize, Serialize};

/// Default content type carried by progress events.
pub const DEFAULT_CONTENT_TYPE: &str = "text/markdown";

/// Lifecycle status of a progress event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// More events follow for the same exchange.
    #[default]
    Incomplete,
    /// Terminal success.
    Complete,
    /// Terminal failure; `status_text` carries the cause.
    Error,
}

impl Status {
    /// Returns true for `Complete` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File or media reference attached to a bot response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "mime_type", alias = "content_type")]
    pub mime_type: String,
}

impl Attachment {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Canonical cross-protocol progress event.
///
/// `content` is always the full text produced so far for `message_id`, never
/// a delta. Decoding is lenient: missing fields fall back to defaults so a
/// receiver never drops an otherwise usable event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Present only when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl ProgressEvent {
    /// Non-terminal snapshot of the cumulative content.
    pub fn incomplete(
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            status: Status::Incomplete,
            message_id: message_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            content_type: default_content_type(),
            attachments,
            status_text: None,
        }
    }

    /// Terminal success carrying the final cumulative content.
    pub fn complete(
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            status: Status::Complete,
            ..Self::incomplete(message_id, sender_id, content, attachments)
        }
    }

    /// Terminal failure. Content and attachments produced before the failure
    /// are preserved.
    pub fn error(
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
        status_text: impl Into<String>,
    ) -> Self {
        Self {
            status: Status::Error,
            status_text: Some(status_text.into()),
            ..Self::incomplete(message_id, sender_id, content, attachments)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Encodes the event as one downstream SSE frame (`data: <json>\n\n`).
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
