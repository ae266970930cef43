//! Drives one exchange: upstream bytes through the decoder and normalizer
//! into an ordered stream of progress events.

use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream::{self, BoxStream};
use tracing::{debug, info, warn};

use crate::decoder::FrameDecoder;
use crate::errors::UpstreamError;
use crate::event::ProgressEvent;
use crate::normalizer::Normalizer;
use crate::upstream::{ByteStream, UpstreamId};

const MESSAGE_ID_PREFIX: &str = "msg";
const CONVERSATION_ID_PREFIX: &str = "conv";

/// Generates `<prefix>-<time-ordered unique suffix>`.
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::now_v7().simple())
}

/// Identifiers assigned once per exchange, before the upstream call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeIds {
    pub message_id: String,
    pub conversation_id: String,
}

impl ExchangeIds {
    /// Fresh message id; the conversation id is kept when supplied and
    /// generated independently otherwise.
    pub fn generate(conversation_id: Option<String>) -> Self {
        Self {
            message_id: generate_id(MESSAGE_ID_PREFIX),
            conversation_id: conversation_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| generate_id(CONVERSATION_ID_PREFIX)),
        }
    }
}

/// Turns an upstream body into progress events.
///
/// Yields `Err` only when the upstream failed or closed before a single
/// parseable frame arrived; callers can still answer with a plain error at
/// that point. Every later failure becomes one terminal `error` event, and an
/// upstream that closes without a terminal frame gets a synthesized
/// `complete`. Reading stops after the first terminal event.
pub fn progress_events(
    upstream: UpstreamId,
    normalizer: Normalizer,
    bytes: ByteStream,
) -> impl futures::Stream<Item = Result<ProgressEvent, UpstreamError>> + Send {
    struct State {
        upstream: UpstreamId,
        bytes: ByteStream,
        decoder: FrameDecoder,
        normalizer: Normalizer,
        pending: VecDeque<Result<ProgressEvent, UpstreamError>>,
        done: bool,
    }

    impl State {
        fn normalize_frames(&mut self, frames: Vec<crate::decoder::Frame>) {
            for frame in frames {
                if let Some(event) = self.normalizer.on_frame(&frame) {
                    self.pending.push_back(Ok(event));
                }
                if self.normalizer.is_terminated() {
                    self.done = true;
                    return;
                }
            }
        }
    }

    let decoder = FrameDecoder::new(normalizer.protocol().framing());
    stream::unfold(
        State {
            upstream,
            bytes,
            decoder,
            normalizer,
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        debug!(upstream = %state.upstream, message_id = %state.normalizer.message_id(), bytes = chunk.len(), "upstream chunk");
                        let frames = state.decoder.push_chunk(&chunk);
                        state.normalize_frames(frames);
                    }
                    Some(Err(err)) => {
                        state.done = true;
                        warn!(upstream = %state.upstream, message_id = %state.normalizer.message_id(), error = %err, "upstream read failed");
                        if state.normalizer.frames_seen() == 0 {
                            state.pending.push_back(Err(err));
                        } else if let Some(event) = state
                            .normalizer
                            .fail(format!("Stream read error: {}", err.message()))
                        {
                            state.pending.push_back(Ok(event));
                        }
                    }
                    None => {
                        let frames = state.decoder.finish();
                        state.normalize_frames(frames);
                        state.done = true;
                        if let Some(event) = state.normalizer.close() {
                            info!(upstream = %state.upstream, message_id = %state.normalizer.message_id(), "upstream closed without terminal frame; synthesizing complete");
                            state.pending.push_back(Ok(event));
                        } else if state.normalizer.frames_seen() == 0 {
                            state.pending.push_back(Err(UpstreamError::protocol(
                                state.upstream.clone(),
                                "upstream closed the stream without sending any frames",
                            )));
                        }
                    }
                }
            }
        },
    )
}

/// Progress events of one open exchange.
///
/// Returned by [`Relay::open`](crate::relay::Relay::open) after the first
/// event is already in hand, so opening fails cleanly when the upstream
/// produced nothing.
pub struct ExchangeStream {
    ids: ExchangeIds,
    sender_id: String,
    first: Option<ProgressEvent>,
    rest: BoxStream<'static, Result<ProgressEvent, UpstreamError>>,
}

impl ExchangeStream {
    pub(crate) fn new(
        ids: ExchangeIds,
        sender_id: String,
        first: ProgressEvent,
        rest: BoxStream<'static, Result<ProgressEvent, UpstreamError>>,
    ) -> Self {
        Self {
            ids,
            sender_id,
            first: Some(first),
            rest,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.ids.message_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.ids.conversation_id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Next event in arrival order; `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        if let Some(first) = self.first.take() {
            return Some(first);
        }
        match self.rest.next().await? {
            Ok(event) => Some(event),
            Err(err) => Some(ProgressEvent::error(
                &self.ids.message_id,
                &self.sender_id,
                "",
                Vec::new(),
                err.message(),
            )),
        }
    }

    /// Drains the exchange and returns every event.
    pub async fn collect_events(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// Consumes the exchange as a plain event stream.
    pub fn into_stream(self) -> BoxStream<'static, ProgressEvent> {
        stream::unfold(self, |mut exchange| async move {
            let event = exchange.next_event().await?;
            Some((event, exchange))
        })
        .boxed()
    }
}
