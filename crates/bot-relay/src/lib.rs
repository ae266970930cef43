//! Streaming relay between chat upstreams and UI clients.
//!
//! Upstream SSE bodies (Poe's typed bot events or Gemini's token deltas) are
//! decoded, normalized into cumulative [`ProgressEvent`]s, and either
//! re-emitted as SSE by a server ([`Relay`], [`sse_body`]) or handed to
//! registered callbacks on the client side ([`Dispatcher`]).
//!
//! Vendor-specific APIs are namespaced under `vendors::*`.
//!
//! # Relaying a Poe bot
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bot_relay::prelude::*;
//! use bot_relay::vendors::poe::{self, PoeAdapter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RelayError> {
//! let relay = Relay::builder()
//!     .register_upstream(Arc::new(PoeAdapter::from_env()?))
//!     .build()?;
//!
//! let mut exchange = relay
//!     .open(&poe::upstream_id(), InboundRequest::new("Assistant", "Say hello"))
//!     .await?;
//! while let Some(event) = exchange.next_event().await {
//!     println!("{}: {}", event.status, event.content);
//! }
//! # Ok(())
//! # }
//! ```

/// Incremental SSE line and frame decoding.
pub mod decoder;
/// Client-side dispatcher with named handlers.
pub mod dispatch;
/// Public error types.
pub mod errors;
/// The progress event model shared by both sides.
pub mod event;
/// Per-exchange driver and identifiers.
pub mod exchange;
/// Frame to progress event mapping for each upstream protocol.
pub mod normalizer;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Server-side relay and SSE encoding.
pub mod relay;
/// Upstream adapter contract.
pub mod upstream;
/// Vendor-specific upstream integrations.
pub mod vendors;

pub use decoder::{Frame, FrameDecoder, Framing, PendingEventTag};
pub use dispatch::{DispatchConfig, Dispatcher, Handler, SendOptions, SendOutcome, parse_bot_name};
pub use errors::{DispatchError, RelayError, UpstreamError};
pub use event::{Attachment, ProgressEvent, Status};
pub use exchange::{ExchangeIds, ExchangeStream, progress_events};
pub use normalizer::{Normalizer, UpstreamProtocol};
pub use observability::init_observability;
pub use relay::{InboundRequest, Relay, RelayBuilder, sse_body};
pub use upstream::{ByteStream, UpstreamAdapter, UpstreamId, UpstreamRequest};
