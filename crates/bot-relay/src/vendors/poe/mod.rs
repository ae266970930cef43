//! Poe bot protocol integration.
//!
//! The bot endpoint answers with `event:`/`data:` pairs (`meta`, `text`,
//! `replace_response`, `done`, `error`), normalized by
//! [`UpstreamProtocol::BotEvents`](crate::normalizer::UpstreamProtocol::BotEvents).
mod adapter;
mod config;

pub use adapter::PoeAdapter;
pub use config::PoeConfig;

/// Upstream id under which [`PoeAdapter`] registers itself.
pub fn upstream_id() -> crate::UpstreamId {
    crate::UpstreamId::new(adapter::POE_UPSTREAM)
}
