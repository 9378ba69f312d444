use std::time::Duration;

/// What kind of failure a transfer error represents.
///
/// Callers branch on this rather than on status codes or message text. Only
/// `Transient` is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote has no such item (404/410).
    NotFound,
    /// The token is missing or does not grant access (401/403).
    Forbidden,
    /// Network failure, timeout, 408/429/5xx, or a short/long body.
    Transient,
    /// The destination cannot be written.
    PermissionDenied,
    /// Downloaded bytes do not match the reference md5 (or none exists).
    IntegrityMismatch,
    /// Stopped by the user.
    Cancelled,
    /// Anything else; not retried.
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with caps, applied per segment.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `retries` retries after the first attempt, with default delays.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Number of retries after the first attempt.
    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// Compute the next backoff delay for a given attempt and error kind.
    ///
    /// `attempt` is 1-based (1 = first attempt). Returns `RetryDecision::NoRetry`
    /// when we should stop retrying.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Transient => {
                // base * 2^(attempt-1), capped.
                let exp = 1u32 << attempt.saturating_sub(1).min(8);
                let raw = self.base_delay.saturating_mul(exp);
                RetryDecision::RetryAfter(raw.min(self.max_delay))
            }
            ErrorKind::NotFound
            | ErrorKind::Forbidden
            | ErrorKind::PermissionDenied
            | ErrorKind::IntegrityMismatch
            | ErrorKind::Cancelled
            | ErrorKind::Other => RetryDecision::NoRetry,
        }
    }
}
