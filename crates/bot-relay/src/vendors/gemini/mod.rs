//! Gemini integration.
//!
//! The streaming endpoint sends untyped `data:` lines, each a partial
//! `GenerateContentResponse`; it has no terminal frame and simply closes.
mod adapter;
mod config;

pub use adapter::{GeminiAdapter, GeminiReply};
pub use config::GeminiConfig;

/// Upstream id under which [`GeminiAdapter`] registers itself.
pub fn upstream_id() -> crate::UpstreamId {
    crate::UpstreamId::new(adapter::GEMINI_UPSTREAM)
}
