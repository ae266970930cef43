use anyhow::Context as _;
use bot_relay::init_observability;
use bot_relay_server::{AppState, ServerArgs, ServerConfig, load_dotenv, router};
use clap::Parser as _;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let args = ServerArgs::parse();
    init_observability();

    let config = ServerConfig::from_args(args).context("failed to load server configuration")?;
    if config.poe.is_none() {
        warn!("POE_API_KEY not set; /api/poe-proxy will answer 500");
    }
    if config.gemini.is_none() {
        warn!("GEMINI_API_KEY not set; /api/gemini will answer 500");
    }
    let state = AppState::new(&config).context("failed to build relay")?;

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!(addr = %config.addr, "bot relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("bot relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl+C, shutting down");
    }
}
