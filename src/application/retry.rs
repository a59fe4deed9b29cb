use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::future::{self, Future};
use std::time::Duration;
use tracing::{debug, warn};

/// How many times a transfer is attempted and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// Wait after the n-th failed attempt. The last entry is reused once the
    /// sequence runs out; an empty sequence means no wait.
    #[serde(default)]
    pub backoff: Vec<Duration>,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Result<Self> {
        let config = Self {
            max_attempts,
            backoff,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TransferError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.backoff
            .get(attempt)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_millis(10),
                Duration::from_millis(50),
                Duration::from_millis(100),
            ],
        }
    }
}

/// Re-runs a whole operation on transient errors.
///
/// Only `Conflict` and `SessionUnavailable` are retried. Every other error is
/// a deterministic outcome of the inputs and is returned on first sight.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt budget
    /// is spent. `op` receives the one-based attempt number.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_cancellable(op, future::pending::<()>()).await
    }

    /// Like [`run`](Self::run), but a backoff wait ends early with
    /// [`TransferError::Cancelled`] once `cancel` completes. Attempts already
    /// in flight are left to observe cancellation themselves.
    pub async fn run_cancellable<T, F, Fut, C>(&self, mut op: F, cancel: C) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let max = self.config.max_attempts;
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt >= max {
                        warn!(attempts = attempt, error = %e, "retry budget exhausted");
                        return Err(TransferError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    let delay = self.config.delay_for((attempt - 1) as usize);
                    debug!(
                        attempt,
                        max,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.as_mut() => {
                            debug!(attempt, "cancelled during backoff");
                            return Err(TransferError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountKey;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> TransferError {
        TransferError::Conflict(AccountKey::from("a"))
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            RetryConfig::new(0, vec![]),
            Err(TransferError::InvalidArgument(_))
        ));
        let bad = RetryConfig {
            max_attempts: 0,
            backoff: vec![],
        };
        assert!(RetryPolicy::new(bad).is_err());
    }

    #[test]
    fn test_delay_capped_to_last_value() {
        let config = RetryConfig::new(
            5,
            vec![Duration::from_millis(1), Duration::from_millis(7)],
        )
        .unwrap();
        assert_eq!(config.delay_for(0), Duration::from_millis(1));
        assert_eq!(config.delay_for(1), Duration::from_millis(7));
        assert_eq!(config.delay_for(4), Duration::from_millis(7));

        let no_wait = RetryConfig::new(2, vec![]).unwrap();
        assert_eq!(no_wait.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_config_deserialization() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 4, "backoff": [{"secs": 0, "nanos": 5000000}]}"#)
                .unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.delay_for(9), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_always_conflicting_exhausts_after_max_attempts() {
        let policy = RetryPolicy::new(RetryConfig::new(3, vec![]).unwrap()).unwrap();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(conflict()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(TransferError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, TransferError::Conflict(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::default();
        let result = policy
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(TransferError::SessionUnavailable("busy".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransferError::InvalidArgument("nope".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TransferError::InvalidArgument(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_applied_between_attempts() {
        let config = RetryConfig::new(
            3,
            vec![Duration::from_millis(100), Duration::from_millis(300)],
        )
        .unwrap();
        let policy = RetryPolicy::new(config).unwrap();
        let start = tokio::time::Instant::now();

        let _: Result<()> = policy.run(|_| async { Err(conflict()) }).await;

        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_cuts_backoff_short() {
        let config = RetryConfig::new(5, vec![Duration::from_secs(60)]).unwrap();
        let policy = RetryPolicy::new(config).unwrap();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<()> = policy
            .run_cancellable(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(conflict()) }
                },
                tokio::time::sleep(Duration::from_secs(1)),
            )
            .await;

        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
