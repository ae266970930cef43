//! Common imports for relay servers and dispatching clients.
pub use crate::{
    DispatchConfig, DispatchError, Dispatcher, ExchangeStream, InboundRequest, ProgressEvent,
    Relay, RelayBuilder, RelayError, SendOptions, Status, UpstreamAdapter, UpstreamId,
    init_observability, sse_body,
};
