//! Client side of the relay: posts a user message to the proxy endpoint and
//! hands every progress event it streams back to a registered handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::decoder::{FrameDecoder, Framing};
use crate::errors::DispatchError;
use crate::event::{Attachment, ProgressEvent, Status};

static BOT_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@([\w\-._]+)\s*").unwrap_or_else(|e| panic!("invalid bot mention pattern: {e}"))
});

/// Callback invoked once per progress event, with the caller's context.
pub type Handler<C> = Arc<dyn Fn(&ProgressEvent, &C) + Send + Sync>;

/// Where and how the dispatcher reaches the relay.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub proxy_url: String,
    /// Bounds only the wait for response headers; the stream itself has no
    /// deadline.
    pub request_timeout: Duration,
}

impl DispatchConfig {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Per-message options for [`Dispatcher::send_user_message`].
#[derive(Clone, Debug)]
pub struct SendOptions<C> {
    /// Name of a registered handler. `None` runs the exchange without
    /// dispatching anything.
    pub handler: Option<String>,
    pub stream: bool,
    pub parameters: Value,
    pub conversation_id: Option<String>,
    /// Passed unchanged to every handler call.
    pub context: C,
}

impl<C> SendOptions<C> {
    pub fn new(context: C) -> Self {
        Self {
            handler: None,
            stream: true,
            parameters: Value::Object(Default::default()),
            conversation_id: None,
            context,
        }
    }

    pub fn handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}

/// Summary of one dispatched exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOutcome {
    /// Handler invocations, synthesized events included.
    pub events_dispatched: usize,
    /// Status of the last event seen, synthesized or received.
    pub final_status: Option<Status>,
    pub message_id: Option<String>,
}

/// Splits a leading `@bot` mention off `text`.
///
/// Returns the bot name and the remaining message, or `None` when `text`
/// does not start with a mention.
pub fn parse_bot_name(text: &str) -> Option<(String, String)> {
    let captures = BOT_MENTION.captures(text)?;
    let whole = captures.get(0)?;
    let name = captures.get(1)?;
    Some((name.as_str().to_string(), text[whole.end()..].to_string()))
}

/// Sends user messages through the relay and fans the streamed progress
/// events out to named handlers.
///
/// The handler registry belongs to this instance; two dispatchers never share
/// handlers.
pub struct Dispatcher<C> {
    client: reqwest::Client,
    config: DispatchConfig,
    handlers: HashMap<String, Handler<C>>,
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("handlers", &names)
            .finish()
    }
}

impl<C: Sync> Dispatcher<C> {
    pub fn new(config: DispatchConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            DispatchError::InvalidInput(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self {
            client,
            config,
            handlers: HashMap::new(),
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Registers `handler` under `name`, returning the one it replaces.
    pub fn register_handler<F>(&mut self, name: impl Into<String>, handler: F) -> Option<Handler<C>>
    where
        F: Fn(&ProgressEvent, &C) + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(handler = %name, "registering handler");
        self.handlers.insert(name, Arc::new(handler))
    }

    pub fn unregister_handler(&mut self, name: &str) -> Option<Handler<C>> {
        self.handlers.remove(name)
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Sends `text` (which must start with `@bot`) through the relay.
    ///
    /// Request-level failures are reported twice: as a synthesized `error`
    /// event to the handler, if one is registered, and as the returned `Err`.
    /// Once streaming has started every failure is delivered in-band and the
    /// call returns `Ok`.
    pub async fn send_user_message(
        &self,
        text: &str,
        options: SendOptions<C>,
    ) -> Result<SendOutcome, DispatchError> {
        let (bot_name, message) = parse_bot_name(text).ok_or_else(|| {
            DispatchError::InvalidInput("No @bot mention found in message".to_string())
        })?;
        let handler = match options.handler.as_deref() {
            Some(name) => {
                let found = self.handlers.get(name).cloned();
                if found.is_none() {
                    warn!(handler = %name, bot = %bot_name, "handler not registered; events will be dropped");
                }
                found
            }
            None => None,
        };
        info!(bot = %bot_name, stream = options.stream, "sending user message");

        let mut body = serde_json::json!({
            "botName": bot_name,
            "message": message,
            "stream": options.stream,
            "parameters": options.parameters,
        });
        if let Some(conversation_id) = options.conversation_id.as_deref() {
            body["conversationId"] = Value::String(conversation_id.to_string());
        }

        let response = match self.post(&body).await {
            Ok(response) => response,
            Err(err) => {
                warn!(bot = %bot_name, error = %err, "relay request failed");
                if let Some(handler) = handler.as_ref() {
                    let event = ProgressEvent::error(
                        "",
                        bot_name.as_str(),
                        "",
                        Vec::new(),
                        err.to_string(),
                    );
                    handler(&event, &options.context);
                }
                return Err(err);
            }
        };

        Ok(pump(
            response.bytes_stream(),
            &bot_name,
            handler.as_ref(),
            &options.context,
        )
        .await)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, DispatchError> {
        let request = self.client.post(&self.config.proxy_url).json(body).send();
        let response = tokio::time::timeout(self.config.request_timeout, request)
            .await
            .map_err(|_| DispatchError::Request {
                message: format!(
                    "Network error: request timed out after {}s",
                    self.config.request_timeout.as_secs()
                ),
                status_code: None,
            })?
            .map_err(|e| DispatchError::Request {
                message: format!("Network error: {e}"),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Request {
                message: format!("Proxy error {}: {text}", status.as_u16()),
                status_code: Some(status.as_u16()),
            });
        }
        Ok(response)
    }
}

struct Delivery<'a, C> {
    bot_name: &'a str,
    handler: Option<&'a Handler<C>>,
    context: &'a C,
    received: usize,
    last: Option<ProgressEvent>,
    outcome: SendOutcome,
}

impl<C> Delivery<'_, C> {
    fn terminated(&self) -> bool {
        self.outcome.final_status.is_some_and(Status::is_terminal)
    }

    fn deliver(&mut self, mut event: ProgressEvent) {
        if event.sender_id.is_empty() {
            event.sender_id = self.bot_name.to_string();
        }
        debug!(
            message_id = %event.message_id,
            status = %event.status,
            content_len = event.content.len(),
            "dispatching progress event"
        );
        self.outcome.final_status = Some(event.status);
        if !event.message_id.is_empty() {
            self.outcome.message_id = Some(event.message_id.clone());
        }
        if let Some(handler) = self.handler {
            handler(&event, self.context);
            self.outcome.events_dispatched += 1;
        }
        self.last = Some(event);
    }

    fn on_data(&mut self, data: &str) {
        match serde_json::from_str::<ProgressEvent>(data) {
            Ok(event) => {
                self.received += 1;
                self.deliver(event);
            }
            Err(e) => warn!(bot = %self.bot_name, error = %e, "dropping malformed relay frame"),
        }
    }

    fn last_parts(&self) -> (String, String, Vec<Attachment>) {
        match self.last.as_ref() {
            Some(last) => (
                last.message_id.clone(),
                last.content.clone(),
                last.attachments.clone(),
            ),
            None => (String::new(), String::new(), Vec::new()),
        }
    }

    fn fail(&mut self, status_text: String) {
        let (message_id, content, attachments) = self.last_parts();
        let event =
            ProgressEvent::error(message_id, self.bot_name, content, attachments, status_text);
        self.deliver(event);
    }

    fn finish(&mut self) {
        if self.terminated() {
            return;
        }
        if self.received == 0 {
            let status_text = format!("No response received from @{}", self.bot_name);
            self.fail(status_text);
            return;
        }
        let (message_id, content, attachments) = self.last_parts();
        let event = ProgressEvent::complete(message_id, self.bot_name, content, attachments);
        self.deliver(event);
    }
}

/// Reads the relay's SSE body to its end (or to the first terminal event)
/// and dispatches every event, synthesizing a terminal one when needed.
async fn pump<S, E, C>(
    body: S,
    bot_name: &str,
    handler: Option<&Handler<C>>,
    context: &C,
) -> SendOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = FrameDecoder::new(Framing::Blocks);
    let mut delivery = Delivery {
        bot_name,
        handler,
        context,
        received: 0,
        last: None,
        outcome: SendOutcome::default(),
    };

    'read: while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for frame in decoder.push_chunk(&bytes) {
                    delivery.on_data(&frame.data);
                    if delivery.terminated() {
                        break 'read;
                    }
                }
            }
            Err(e) => {
                warn!(bot = %bot_name, error = %e, "relay stream read failed");
                delivery.fail(format!("Stream read error: {e}"));
                break 'read;
            }
        }
    }

    if !delivery.terminated() {
        for frame in decoder.finish() {
            delivery.on_data(&frame.data);
            if delivery.terminated() {
                break;
            }
        }
    }
    delivery.finish();
    info!(
        bot = %bot_name,
        events = delivery.outcome.events_dispatched,
        final_status = ?delivery.outcome.final_status,
        "exchange finished"
    );
    delivery.outcome
}
