//! HTTP surface: `/api/poe-proxy`, `/api/gemini`, `/api/health`.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bot_relay::exchange::ExchangeIds;
use bot_relay::vendors::gemini::{self, GeminiAdapter};
use bot_relay::vendors::poe::{self, PoeAdapter};
use bot_relay::{ExchangeStream, InboundRequest, Relay, RelayError, UpstreamId, UpstreamRequest, sse_body};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    relay: Relay,
    gemini: Option<Arc<GeminiAdapter>>,
    system_prompt_len: Option<usize>,
}

impl AppState {
    /// Registers an adapter for every upstream that has a key.
    pub fn new(config: &ServerConfig) -> Result<Self, RelayError> {
        let mut builder = Relay::builder();
        if let Some(poe) = config.poe.clone() {
            builder = builder.register_upstream(Arc::new(PoeAdapter::new(poe)?));
        }
        let gemini = match config.gemini.clone() {
            Some(gemini) => Some(Arc::new(GeminiAdapter::new(gemini)?)),
            None => None,
        };
        if let Some(adapter) = gemini.as_ref() {
            builder = builder.register_upstream(adapter.clone());
        }
        let system_prompt_len = config
            .gemini
            .as_ref()
            .and_then(|g| g.system_prompt.as_ref())
            .map(|p| p.chars().count());

        Ok(Self {
            relay: builder.build()?,
            gemini,
            system_prompt_len,
        })
    }
}

/// Builds the router with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/poe-proxy",
            post(poe_proxy).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/api/gemini",
            post(gemini_proxy).options(preflight).fallback(method_not_allowed),
        )
        .route("/api/health", get(health).options(preflight))
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn relay_error_response(err: RelayError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match err {
        RelayError::Upstream(upstream) => upstream.message().to_string(),
        RelayError::Config(message) | RelayError::Input(message) => message,
        RelayError::UpstreamNotFound { upstream } => format!("{upstream} upstream not configured"),
    };
    warn!(status = status.as_u16(), error = %message, "relay request failed");
    error_response(status, message)
}

fn sse_response(exchange: ExchangeStream) -> Response {
    let mut response = Response::new(Body::from_stream(sse_body(exchange)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Parses the body leniently: missing fields default, broken JSON is a 400.
fn parse_inbound(body: &Bytes) -> Result<InboundRequest, Response> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid JSON body"))
}

async fn open_stream(relay: &Relay, upstream: &UpstreamId, inbound: InboundRequest) -> Response {
    match relay.open(upstream, inbound).await {
        Ok(exchange) => {
            info!(upstream = %upstream, message_id = exchange.message_id(), "streaming exchange");
            sse_response(exchange)
        }
        Err(err) => relay_error_response(err),
    }
}

async fn poe_proxy(State(state): State<AppState>, body: Bytes) -> Response {
    let upstream = poe::upstream_id();
    if !state.relay.has_upstream(&upstream) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "POE_API_KEY not configured");
    }
    let inbound = match parse_inbound(&body) {
        Ok(inbound) => inbound,
        Err(response) => return response,
    };
    if inbound.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "Missing botName or message");
    }
    open_stream(&state.relay, &upstream, inbound).await
}

async fn gemini_proxy(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(adapter) = state.gemini.clone() else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "GEMINI_API_KEY not configured");
    };
    let inbound = match parse_inbound(&body) {
        Ok(inbound) => inbound,
        Err(response) => return response,
    };
    if inbound.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "Missing model or message");
    }
    if inbound.stream {
        return open_stream(&state.relay, &gemini::upstream_id(), inbound).await;
    }

    let ids = ExchangeIds::generate(inbound.conversation_id);
    let request = UpstreamRequest {
        target: inbound.target,
        message: inbound.message,
        conversation_id: ids.conversation_id,
        message_id: ids.message_id,
        parameters: inbound.parameters,
    };
    match adapter.generate(&request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => relay_error_response(err.into()),
    }
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

#[derive(Serialize)]
struct EnvReport {
    #[serde(rename = "GEMINI_API_KEY")]
    gemini_api_key: bool,
    #[serde(rename = "POE_API_KEY")]
    poe_api_key: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: &'static str,
    timestamp: String,
    env: EnvReport,
    system_prompt: bool,
    system_prompt_length: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        env: EnvReport {
            gemini_api_key: state.gemini.is_some(),
            poe_api_key: state.relay.has_upstream(&poe::upstream_id()),
        },
        system_prompt: state.system_prompt_len.is_some(),
        system_prompt_length: state.system_prompt_len.unwrap_or(0),
    })
}
