//! Retry/backoff classification for fetch attempts.
//!
//! Kept as a small hand-rolled policy rather than a generic retry crate so it
//! can inspect the HTTP status/error kind directly, per spec.md §4.3: timeouts,
//! connection resets, and 5xx are retryable; 4xx other than 408/429 fail the
//! item immediately.

use std::time::Duration;

/// Exponential backoff delays: 500ms, 1s, 2s, capped at 3 attempts.
pub const BACKOFF: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
];

pub const MAX_ATTEMPTS: usize = BACKOFF.len() + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Retryable,
    Terminal,
}

/// Classifies an HTTP status code as retryable or terminal, per spec.md
/// §4.3: 408 and 429 are treated as transient even though they are 4xx.
pub fn classify_status(status: u16) -> FetchOutcome {
    if status == 408 || status == 429 {
        FetchOutcome::Retryable
    } else if (500..600).contains(&status) {
        FetchOutcome::Retryable
    } else {
        FetchOutcome::Terminal
    }
}

/// Classifies a transport-level `reqwest::Error` (no status code available —
/// connect/timeout/body-read failures) as always retryable.
pub fn classify_transport_error(_err: &reqwest::Error) -> FetchOutcome {
    FetchOutcome::Retryable
}

pub fn backoff_for_attempt(attempt: usize) -> Option<Duration> {
    BACKOFF.get(attempt).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert_eq!(classify_status(500), FetchOutcome::Retryable);
        assert_eq!(classify_status(503), FetchOutcome::Retryable);
    }

    #[test]
    fn request_timeout_and_rate_limit_are_retryable() {
        assert_eq!(classify_status(408), FetchOutcome::Retryable);
        assert_eq!(classify_status(429), FetchOutcome::Retryable);
    }

    #[test]
    fn other_client_errors_are_terminal() {
        assert_eq!(classify_status(404), FetchOutcome::Terminal);
        assert_eq!(classify_status(401), FetchOutcome::Terminal);
    }

    #[test]
    fn backoff_sequence_is_exponential() {
        assert_eq!(backoff_for_attempt(0), Some(Duration::from_millis(500)));
        assert_eq!(backoff_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(backoff_for_attempt(2), Some(Duration::from_secs(2)));
        assert_eq!(backoff_for_attempt(3), None);
    }
}
