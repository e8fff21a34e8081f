//! Retry utilities: backoff builders for projection batches.
//!
//! Uses `backon` for exponential backoff with jitter.

use backon::ExponentialBuilder;

use crate::config::RetryPolicy;
use crate::projection::ProjectionError;

/// Backoff for transient failures while processing a projection batch.
///
/// Delays start at `base_delay`, double per attempt up to `max_delay`, and
/// stop once the operation has run `max_attempts` times in total. Jitter
/// enabled.
pub fn projection_backoff(policy: &RetryPolicy) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(policy.base_delay)
        .with_max_delay(policy.max_delay)
        // backon counts retries, not attempts.
        .with_max_times(policy.max_attempts.saturating_sub(1))
        .with_jitter()
}

/// Determines if a batch failure is worth retrying.
///
/// Only transient store failures (busy database, dropped connection, store
/// call timeout) are retried. Decode, missing-row and conflict failures will
/// fail the same way on every attempt.
pub fn is_retryable(err: &ProjectionError) -> bool {
    err.is_retryable()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use backon::{BackoffBuilder, Retryable};

    use super::*;
    use crate::projection::ReduceError;
    use crate::storage::StorageError;

    #[test]
    fn test_backoff_respects_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        };
        let delays: Vec<_> = projection_backoff(&policy).build().collect();
        assert_eq!(delays.len(), 2);
        // Jitter adds up to one extra min_delay on top of each step.
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(80)));
    }

    #[tokio::test]
    async fn test_operation_runs_max_attempts_times() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicUsize::new(0);

        let result: Result<(), ProjectionError> = (|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProjectionError::Storage(StorageError::Unavailable(
                "busy".into(),
            )))
        })
        .retry(projection_backoff(&policy))
        .when(is_retryable)
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        assert_eq!(projection_backoff(&policy).build().count(), 0);
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&ProjectionError::Storage(
            StorageError::Unavailable("busy".into())
        )));
        assert!(is_retryable(&ProjectionError::Timeout(Duration::from_secs(
            1
        ))));
        assert!(!is_retryable(&ProjectionError::Reduce {
            aggregate_type: "user".into(),
            aggregate_id: "u".into(),
            event_type: "user.removed".into(),
            sequence: 1,
            source: ReduceError::decode("PROJE-1", "bad payload"),
        }));
        assert!(!is_retryable(&ProjectionError::LockLost("p".into())));
    }
}
