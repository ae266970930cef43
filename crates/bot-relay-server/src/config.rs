use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bot_relay::vendors::gemini::GeminiConfig;
use bot_relay::vendors::poe::PoeConfig;
use clap::Parser;

/// Loads `.env` from the crate directory, then from the working directory.
/// Variables already set in the process win.
pub fn load_dotenv() {
    dotenvy::from_path(Path::new(env!("CARGO_MANIFEST_DIR")).join(".env")).ok();
    dotenvy::dotenv().ok();
}

/// Command line of `bot-relay-server`. Every flag falls back to an
/// environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "bot-relay-server")]
#[command(about = "Relays Poe bot and Gemini streams to browsers as cumulative SSE progress events")]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "BOT_RELAY_ADDR", default_value = "127.0.0.1:3000")]
    pub addr: SocketAddr,

    /// Poe API key; the Poe route answers 500 without it
    #[arg(long, env = "POE_API_KEY", hide_env_values = true)]
    pub poe_api_key: Option<String>,

    /// Override for the Poe API base URL
    #[arg(long, env = "POE_BASE_URL")]
    pub poe_base_url: Option<String>,

    /// Gemini API key; the Gemini route answers 500 without it
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Override for the Gemini API base URL
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    /// System instruction sent with every Gemini request
    #[arg(long, env = "BOT_RELAY_SYSTEM_PROMPT", conflicts_with = "system_prompt_path")]
    pub system_prompt: Option<String>,

    /// File holding the Gemini system instruction
    #[arg(long, env = "BOT_RELAY_SYSTEM_PROMPT_PATH")]
    pub system_prompt_path: Option<PathBuf>,

    /// Seconds to wait for upstream response headers
    #[arg(long, env = "BOT_RELAY_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,
}

/// Resolved server configuration. `None` upstreams stay unregistered.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub poe: Option<PoeConfig>,
    pub gemini: Option<GeminiConfig>,
}

impl ServerConfig {
    /// Reads the prompt file, if any, and builds per-upstream configs.
    pub fn from_args(args: ServerArgs) -> std::io::Result<Self> {
        let timeout = Duration::from_secs(args.request_timeout_secs);
        let system_prompt = match args.system_prompt_path.as_deref() {
            Some(path) => Some(std::fs::read_to_string(path)?),
            None => args.system_prompt,
        };

        let poe = non_blank(args.poe_api_key).map(|key| {
            let config = PoeConfig::new(key).request_timeout(timeout);
            match non_blank(args.poe_base_url) {
                Some(base_url) => config.base_url(base_url),
                None => config,
            }
        });
        let gemini = non_blank(args.gemini_api_key).map(|key| {
            let mut config = GeminiConfig::new(key).request_timeout(timeout);
            if let Some(base_url) = non_blank(args.gemini_base_url) {
                config = config.base_url(base_url);
            }
            if let Some(prompt) = system_prompt {
                config = config.system_prompt(prompt);
            }
            config
        });

        Ok(Self {
            addr: args.addr,
            poe,
            gemini,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
