//! Shared HTTP transport helpers for the gateway and backend clients.

use std::time::{Duration, Instant};

/// Milliseconds elapsed since `start`, saturating.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    let millis = start.elapsed().as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Human-readable cause for a failed request.
pub(crate) fn describe_transport_error(
    err: &reqwest::Error,
    timeout: Duration,
    url: &str,
) -> String {
    if err.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs_f64())
    } else if err.is_connect() {
        format!("unable to reach {url}: {err}")
    } else if err.is_builder() {
        format!("invalid request: {err}")
    } else {
        format!("request failed: {err}")
    }
}

pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
