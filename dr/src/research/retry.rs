//! Stage-boundary retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::error::{StageError, StageKind};
use crate::config::RetryConfig;

/// Delay before retry number `attempt` (1-based)
///
/// Doubles from `initial_backoff_ms`, capped at `max_backoff_ms`, then jittered
/// into the upper half of that window.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(20);
    let base = config
        .initial_backoff_ms
        .saturating_mul(1u64 << shift)
        .min(config.max_backoff_ms);
    let half = base / 2;
    let jitter = if half > 0 { rand::rng().random_range(0..=half) } else { 0 };
    Duration::from_millis(base - half + jitter)
}

/// Run `op` until it succeeds, fails for good, or attempts run out
///
/// Rate-limit waits requested by a collaborator take precedence over the
/// computed backoff.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, stage: StageKind, mut op: F) -> Result<T, StageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        debug!(%stage, attempt, max_attempts, "with_backoff: attempt");
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = e.retry_after().unwrap_or_else(|| backoff_delay(config, attempt));
                warn!(%stage, attempt, max_attempts, ?delay, error = %e, "Stage failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(%stage, attempt, retryable = e.is_retryable(), "with_backoff: giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    fn transient() -> StageError {
        StageError::Invocation {
            stage: StageKind::Research,
            message: "503".to_string(),
            retryable: true,
            retry_after: None,
        }
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
        };
        for _ in 0..50 {
            let first = backoff_delay(&config, 1).as_millis();
            assert!((50..=100).contains(&first));
            let second = backoff_delay(&config, 2).as_millis();
            assert!((100..=200).contains(&second));
            let capped = backoff_delay(&config, 10).as_millis();
            assert!((150..=300).contains(&capped));
        }
    }

    #[test]
    fn test_backoff_delay_zero() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        };
        assert_eq!(backoff_delay(&config, 3), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast(), StageKind::Research, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast(), StageKind::Research, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_result_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast(), StageKind::GenerateQueries, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StageError::empty(StageKind::GenerateQueries, "search queries"))
        })
        .await;

        assert!(matches!(result, Err(StageError::EmptyResult { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schema_error_retried() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast(), StageKind::Reflect, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StageError::schema(StageKind::Reflect, "not json"))
            } else {
                Ok(1)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_config() {
        let config = RetryConfig {
            max_attempts: 0,
            ..fast()
        };
        let calls = AtomicU32::new(0);
        let _: Result<(), _> = with_backoff(&config, StageKind::Research, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
