//! Retry policy for the enrichment + scoring step.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::core::EngineError;

/// Substrings (lowercase) that mark an error as transient.
pub const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "rate limit",
    "quota exceeded",
    "service unavailable",
    "internal server error",
    "connection refused",
    "connection reset",
    "temporary failure",
];

/// True when `message` contains a transient-failure marker, case-insensitively.
#[must_use]
pub fn is_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| message.contains(p))
}

/// Convert a collaborator error into an engine error, keeping the whole chain.
#[must_use]
pub fn classify(err: &anyhow::Error) -> EngineError {
    let message = format!("{err:#}");
    EngineError::External {
        transient: is_transient(&message),
        message,
    }
}

/// Backoff before retry `attempt` (counted from 1): `attempt² × base`.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(attempt.saturating_mul(attempt))
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// # Errors
///
/// Returns `EngineError::Cancelled` when cancelled during the wait.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), EngineError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EngineError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Run `fut` unless `cancel` fires first.
///
/// # Errors
///
/// Returns `EngineError::Cancelled` when cancelled before `fut` completes.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EngineError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Bounded retry with quadratic backoff and transient-only eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Base delay.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy from configuration.
    #[must_use]
    pub const fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: cfg.base_delay(),
        }
    }

    /// Whether to retry after `retries_used` retries failed with `err`.
    #[must_use]
    pub const fn should_retry(&self, retries_used: u32, err: &EngineError) -> bool {
        retries_used < self.max_retries
            && matches!(err, EngineError::External { transient: true, .. })
    }

    /// Delay before retry `attempt` (counted from 1).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_patterns_case_insensitive() {
        assert!(is_transient("Request TIMEOUT after 30s"));
        assert!(is_transient("429: Rate Limit reached"));
        assert!(is_transient("upstream: Service Unavailable"));
        assert!(is_transient("dial tcp: connection reset by peer"));
        assert!(!is_transient("invalid api key"));
        assert!(!is_transient("venue not found"));
    }

    #[test]
    fn test_classify_uses_error_chain() {
        let err = anyhow::anyhow!("quota exceeded").context("scoring failed");
        match classify(&err) {
            EngineError::External { message, transient } => {
                assert!(transient);
                assert!(message.contains("scoring failed"));
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_backoff_is_quadratic() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(1, base), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base), Duration::from_secs(9));
    }

    #[test]
    fn test_should_retry_only_transient_within_budget() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        };
        let transient = EngineError::External {
            message: "timeout".into(),
            transient: true,
        };
        let terminal = EngineError::External {
            message: "bad request".into(),
            transient: false,
        };
        assert!(policy.should_retry(0, &transient));
        assert!(policy.should_retry(1, &transient));
        assert!(!policy.should_retry(2, &transient));
        assert!(!policy.should_retry(0, &terminal));
        assert!(!policy.should_retry(0, &EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_sleep_cancelled_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = std::time::Instant::now();
        let res = sleep_or_cancel(Duration::from_secs(30), &cancel).await;
        assert_eq!(res, Err(EngineError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::from_millis(5), &cancel).await.is_ok());
    }
}
