//! Process-wide tracing setup for binaries embedding the relay.
//!
//! Environment variables:
//! - `BOT_RELAY_OBSERVABILITY_ENABLED`: enable/disable flag (default enabled).
//! - `BOT_RELAY_LOG_LEVEL`: level or filter directive (`info`, `bot_relay=debug`).
//! - `BOT_RELAY_JSON_LOG_PATH`: write JSONL to this file instead of the console.
//! - `RUST_LOG`: filter used when `BOT_RELAY_LOG_LEVEL` is unset or invalid.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "bot-relay.logs.jsonl";

/// Settings resolved from the environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservabilitySettings {
    pub enabled: bool,
    pub log_level: Option<String>,
    pub json_log_path: Option<PathBuf>,
}

impl ObservabilitySettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("BOT_RELAY_OBSERVABILITY_ENABLED")
            .map(|value| parse_bool(&value).unwrap_or(true))
            .unwrap_or(true);
        Self {
            enabled,
            log_level: lookup("BOT_RELAY_LOG_LEVEL").filter(|v| !v.trim().is_empty()),
            json_log_path: lookup("BOT_RELAY_JSON_LOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(level) = self.log_level.as_deref()
            && let Ok(filter) = EnvFilter::try_new(level)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Installs the global subscriber once per process. Later calls are no-ops,
/// as is a call made after another subscriber was installed.
pub fn init_observability() {
    INIT.get_or_init(|| install(&ObservabilitySettings::from_env()));
}

fn install(settings: &ObservabilitySettings) {
    if !settings.enabled {
        return;
    }
    let filter = settings.env_filter();

    match settings.json_log_path.as_deref() {
        Some(path) => {
            let (dir, file_name) = split_log_path(path);
            let _ = std::fs::create_dir_all(dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init();
        }
        None => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stdout);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> ObservabilitySettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilitySettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_enabled_console_logging() {
        let s = settings(&[]);
        assert!(s.enabled);
        assert_eq!(s.log_level, None);
        assert_eq!(s.json_log_path, None);
    }

    #[test]
    fn reads_overrides() {
        let s = settings(&[
            ("BOT_RELAY_OBSERVABILITY_ENABLED", "off"),
            ("BOT_RELAY_LOG_LEVEL", "bot_relay=debug"),
            ("BOT_RELAY_JSON_LOG_PATH", "logs/relay.jsonl"),
        ]);
        assert!(!s.enabled);
        assert_eq!(s.log_level.as_deref(), Some("bot_relay=debug"));
        assert_eq!(s.json_log_path, Some(PathBuf::from("logs/relay.jsonl")));
    }

    #[test]
    fn unknown_flag_value_keeps_logging_on() {
        assert!(settings(&[("BOT_RELAY_OBSERVABILITY_ENABLED", "maybe")]).enabled);
    }

    #[test]
    fn log_path_without_directory_uses_cwd() {
        assert_eq!(
            split_log_path(Path::new("relay.jsonl")),
            (Path::new("."), "relay.jsonl")
        );
        assert_eq!(
            split_log_path(Path::new("/var/log/relay.jsonl")),
            (Path::new("/var/log"), "relay.jsonl")
        );
    }
}
