//! HTTP front end for the bot relay.
//!
//! Exposes the Poe and Gemini upstreams as SSE endpoints that browsers can
//! consume with [`bot_relay::Dispatcher`] or a plain `EventSource` reader.

pub mod config;
pub mod routes;

pub use config::{ServerArgs, ServerConfig, load_dotenv};
pub use routes::{AppState, router};

/// Serves the relay on an already bound listener until it fails.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
