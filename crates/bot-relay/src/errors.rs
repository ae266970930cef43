use crate::upstream::UpstreamId;

/// Errors returned by an upstream adapter.
///
/// `Request` failures happen before any response byte was read; `Stream`
/// failures happen afterwards and are turned into an in-band error event by
/// the exchange driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Network failure or non-success response before streaming started.
    #[error("upstream request error ({upstream}): {message}")]
    Request {
        upstream: UpstreamId,
        message: String,
        status_code: Option<u16>,
    },
    /// Reading the response body failed after streaming started.
    #[error("upstream stream error ({upstream}): {message}")]
    Stream {
        upstream: UpstreamId,
        message: String,
    },
    /// The upstream reported a failure through its own protocol.
    #[error("upstream protocol error ({upstream}): {message}")]
    Protocol {
        upstream: UpstreamId,
        message: String,
    },
}

impl UpstreamError {
    /// Creates a request-level error.
    pub fn request(
        upstream: impl Into<UpstreamId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Request {
            upstream: upstream.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a stream read error.
    pub fn stream(upstream: impl Into<UpstreamId>, message: impl Into<String>) -> Self {
        Self::Stream {
            upstream: upstream.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(upstream: impl Into<UpstreamId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            upstream: upstream.into(),
            message: message.into(),
        }
    }

    /// Returns the upstream associated with this error.
    pub fn upstream_id(&self) -> &UpstreamId {
        match self {
            Self::Request { upstream, .. }
            | Self::Stream { upstream, .. }
            | Self::Protocol { upstream, .. } => upstream,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Request { message, .. }
            | Self::Stream { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }

    /// HTTP status reported by the upstream, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Request { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

/// Top-level error type for the relay API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Invalid relay or upstream configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Caller input was rejected before any network call.
    #[error("input error: {0}")]
    Input(String),
    /// No adapter is registered for the requested upstream.
    #[error("upstream not configured: {upstream}")]
    UpstreamNotFound { upstream: UpstreamId },
    /// Upstream failed before the progress stream was opened.
    #[error(transparent)]
    Upstream(UpstreamError),
}

impl RelayError {
    /// Status code to use when this error is reported as a plain HTTP error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Input(_) => 400,
            Self::Config(_) | Self::UpstreamNotFound { .. } => 500,
            Self::Upstream(err) => err.status_code().unwrap_or(500),
        }
    }
}

impl From<UpstreamError> for RelayError {
    fn from(value: UpstreamError) -> Self {
        RelayError::Upstream(value)
    }
}

/// Errors surfaced to callers of [`Dispatcher::send_user_message`](crate::dispatch::Dispatcher::send_user_message).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The outbound message could not be sent as given (no `@bot` prefix, bad config).
    #[error("{0}")]
    InvalidInput(String),
    /// The proxy request failed before streaming started.
    #[error("{message}")]
    Request {
        message: String,
        status_code: Option<u16>,
    },
}

impl DispatchError {
    /// Coarse error category reported to UI code.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Request { .. } => "UNKNOWN",
        }
    }
}
