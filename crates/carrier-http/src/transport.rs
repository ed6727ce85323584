//! Boundary with the transport engine
//!
//! Everything below this call (DNS, TLS, framing, pooling, redirects) belongs
//! to reqwest; this module only sends and hands back the raw parts.

use crate::coerce::BodyStream;
use crate::error::{HttpError, HttpResult};
use futures::TryStreamExt;
use http::{HeaderMap, Version};
use std::io;
use std::time::{Duration, Instant};

/// Response as it comes off the transport, body unread
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub url: String,
    pub version: Version,
    pub elapsed: Duration,
    pub body: BodyStream,
}

/// Send `request` and wait for the response head.
pub(crate) async fn invoke(
    client: &reqwest::Client,
    request: reqwest::Request,
) -> HttpResult<RawResponse> {
    let started = Instant::now();
    let response = client.execute(request).await.map_err(|e| {
        let err = HttpError::Transport(e);
        tracing::warn!(error = %err.sanitized_message(), "HTTP transport failure");
        err
    })?;
    let elapsed = started.elapsed();

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let url = response.url().to_string();
    let version = response.version();
    let body = BodyStream::new(response.bytes_stream().map_err(io::Error::other));

    Ok(RawResponse {
        status,
        headers,
        url,
        version,
        elapsed,
        body,
    })
}

/// Whole milliseconds, rounded up so a completed exchange never reports 0.
pub(crate) fn elapsed_millis(elapsed: Duration) -> u64 {
    let millis = elapsed.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}
