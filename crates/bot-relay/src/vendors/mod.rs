//! Upstream integrations.
//!
//! Each vendor module owns its config, request body shape and adapter; the
//! helpers here cover the HTTP plumbing they share.

pub mod gemini;
pub mod poe;

use std::time::Duration;

use futures::StreamExt as _;

use crate::errors::UpstreamError;
use crate::upstream::{ByteStream, UpstreamId};

/// Sends a request, bounding only the wait for response headers.
///
/// The body stream itself has no deadline; a stalled upstream is ended by
/// the transport or by the caller dropping the stream.
pub(crate) async fn send_with_timeout(
    upstream: &UpstreamId,
    label: &str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, UpstreamError> {
    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| {
            UpstreamError::request(
                upstream.clone(),
                format!("{label} request timed out after {}s", timeout.as_secs()),
                None,
            )
        })?
        .map_err(|e| {
            UpstreamError::request(upstream.clone(), format!("{label} request failed: {e}"), None)
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::request(
            upstream.clone(),
            format!("{label} {}: {body}", status.as_u16()),
            Some(status.as_u16()),
        ));
    }
    Ok(response)
}

/// Wraps a response body, mapping transport failures to stream errors.
pub(crate) fn body_stream(upstream: UpstreamId, response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(move |chunk| {
        chunk.map_err(|e| UpstreamError::stream(upstream.clone(), e.to_string()))
    }))
}
