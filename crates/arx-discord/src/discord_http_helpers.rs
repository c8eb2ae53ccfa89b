//! Retry and error-shaping helpers shared by Discord REST calls.

use std::time::Duration;

const RETRY_DELAY_CAP_MS: u64 = 30_000;

/// Returns true when the status is worth retrying (rate limit or server error).
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Reads a `Retry-After` header expressed in seconds, when present and sane.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_millis((seconds * 1_000.0) as u64))
}

/// Exponential backoff with the server-provided delay taking precedence.
pub(crate) fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after;
    }
    let exponent = attempt.saturating_sub(1).min(16) as u32;
    let delay_ms = base_delay_ms
        .max(1)
        .saturating_mul(1_u64 << exponent)
        .min(RETRY_DELAY_CAP_MS);
    Duration::from_millis(delay_ms)
}

pub(crate) fn truncate_for_error(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let kept = trimmed.chars().take(max_chars).collect::<String>();
    format!("{kept}…")
}
