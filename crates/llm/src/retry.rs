use async_trait::async_trait;
use doodle_core::LlmConfig;
use doodle_tool_runtime::{CompletionResponse, LlmError};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One transport attempt, re-creatable for each retry.
pub type CallFuture<'a> = BoxFuture<'a, Result<CompletionResponse, LlmError>>;

/// Wraps every transport invocation of a model. Retry lives here so the
/// adapter itself never loops.
#[async_trait]
pub trait CallWrapper: Send + Sync {
    async fn call<'a>(
        &self,
        op: &(dyn Fn() -> CallFuture<'a> + Send + Sync + 'a),
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, LlmError>;
}

/// Runs the operation once, racing it against cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

#[async_trait]
impl CallWrapper for NoRetry {
    async fn call<'a>(
        &self,
        op: &(dyn Fn() -> CallFuture<'a> + Send + Sync + 'a),
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, LlmError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            result = op() => result,
        }
    }
}

/// Exponential backoff for retryable errors.
///
/// Every attempt gets its own timeout. A server-sent `retry-after` replaces
/// the computed delay. Cancellation is honored while an attempt is in flight
/// and while sleeping between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 means a single attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.retry_base_delay(),
            attempt_timeout: config.timeout(),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1`.
    fn backoff(&self, attempt: u32, error: &LlmError) -> Duration {
        if let Some(wait) = error.retry_after() {
            return wait;
        }
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[async_trait]
impl CallWrapper for RetryPolicy {
    async fn call<'a>(
        &self,
        op: &(dyn Fn() -> CallFuture<'a> + Send + Sync + 'a),
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                result = tokio::time::timeout(self.attempt_timeout, op()) => {
                    result.unwrap_or(Err(LlmError::Timeout(self.attempt_timeout)))
                }
            };

            let error = match result {
                Ok(response) => {
                    if attempt > 0 {
                        debug!(attempt, "Model call succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.max_retries {
                if attempt == 0 {
                    return Err(error);
                }
                return Err(LlmError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(error),
                });
            }

            let delay = self.backoff(attempt, &error);
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying model call");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// Fails with `error()` for the first `failures` calls, then succeeds.
    async fn run_flaky(
        wrapper: &dyn CallWrapper,
        failures: u32,
        error: fn() -> LlmError,
        cancel: &CancellationToken,
    ) -> (Result<CompletionResponse, LlmError>, u32) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || -> CallFuture<'static> {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n < failures {
                    Err(error())
                } else {
                    Ok(CompletionResponse::new("ok"))
                }
            })
        };
        let result = wrapper.call(&op, cancel).await;
        (result, calls.load(Ordering::SeqCst))
    }

    fn server_error() -> LlmError {
        LlmError::Api {
            status: 500,
            message: "overloaded".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let (result, calls) = run_flaky(&policy(3), 2, server_error, &CancellationToken::new()).await;
        assert_eq!(result.unwrap().text, "ok");
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted() {
        let (result, calls) = run_flaky(&policy(2), 10, server_error, &CancellationToken::new()).await;
        assert_eq!(calls, 3);
        match result.unwrap_err() {
            LlmError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, LlmError::Api { status: 500, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let (result, calls) = run_flaky(
            &policy(3),
            10,
            || LlmError::Auth("bad key".into()),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(LlmError::Auth(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_returns_plain_error() {
        let (result, calls) = run_flaky(&policy(0), 10, server_error, &CancellationToken::new()).await;
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(LlmError::Api { status: 500, .. })));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(5);
        let err = server_error();
        assert_eq!(p.backoff(0, &err), Duration::from_millis(100));
        assert_eq!(p.backoff(1, &err), Duration::from_millis(200));
        assert_eq!(p.backoff(3, &err), Duration::from_millis(800));
        assert_eq!(p.backoff(4, &err), Duration::from_secs(1));
        assert_eq!(p.backoff(40, &err), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_honors_retry_after() {
        let err = LlmError::RateLimited {
            retry_after_secs: Some(7),
        };
        assert_eq!(policy(3).backoff(0, &err), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let p = RetryPolicy {
            max_retries: 1,
            attempt_timeout: Duration::from_millis(50),
            ..policy(1)
        };
        let op = || -> CallFuture<'static> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(CompletionResponse::new("late"))
            })
        };
        let err = p.call(&op, &CancellationToken::new()).await.unwrap_err();
        match err {
            LlmError::RetriesExhausted { attempts: 2, last } => {
                assert!(matches!(*last, LlmError::Timeout(_)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let p = RetryPolicy {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            ..policy(3)
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let (result, calls) = run_flaky(&p, 10, server_error, &cancel).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_calls() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (result, calls) = run_flaky(&policy(3), 0, server_error, &cancel).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_no_retry_passes_through() {
        let (result, calls) = run_flaky(&NoRetry, 1, server_error, &CancellationToken::new()).await;
        assert_eq!(calls, 1);
        assert!(result.is_err());
    }
}
