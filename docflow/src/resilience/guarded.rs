//! One external call wrapped in deadline, retry and breaker.

use super::{CircuitBreaker, RetryPolicy, TimeoutGuard};
use crate::errors::{CircuitOpenError, Classify, TimeoutElapsed};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// The result of a guarded call and how many times the operation ran.
#[derive(Debug)]
pub struct CallReport<T, E> {
    /// Final result after retries, or the breaker's rejection.
    pub result: Result<T, E>,
    /// Invocations of the wrapped operation. Zero when the breaker rejected.
    pub attempts: u32,
}

/// Composes the three primitives around calls to one dependency.
///
/// ```text
/// breaker( retry( timeout( operation ) ) )
/// ```
///
/// The breaker sees one outcome per call: a call whose retries are exhausted
/// is one failure, and a call that recovers on a later attempt is one
/// success. The deadline applies to every attempt separately.
#[derive(Debug, Clone)]
pub struct GuardedCall {
    name: String,
    timeout: Option<TimeoutGuard>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedCall {
    /// Creates a guarded call. Without a timeout guard attempts run unbounded.
    pub fn new(
        name: impl Into<String>,
        timeout: Option<TimeoutGuard>,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            name: name.into(),
            timeout,
            retry,
            breaker,
        }
    }

    /// Returns the call name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the per-attempt deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<&TimeoutGuard> {
        self.timeout.as_ref()
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the shared breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Maximum number of invocations per call.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry.config().max_attempts
    }

    /// Runs `operation` under the breaker, retry policy and deadline.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> CallReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display + From<TimeoutElapsed> + From<CircuitOpenError>,
    {
        let attempts = AtomicU32::new(0);
        let timeout = self.timeout.as_ref();

        let attempt = |_: u32| {
            attempts.fetch_add(1, Ordering::Relaxed);
            let future = operation();
            async move {
                match timeout {
                    Some(guard) => guard.run(future).await,
                    None => future.await,
                }
            }
        };
        let result = self
            .breaker
            .execute(move || self.retry.run(attempt))
            .await;

        CallReport {
            result,
            attempts: attempts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IngestError;
    use crate::resilience::{CircuitBreakerConfig, CircuitState, RetryConfig};
    use std::time::Duration;

    fn call(max_attempts: u32, threshold: u32, timeout_ms: Option<u64>) -> GuardedCall {
        let retry = RetryPolicy::new(
            "ai",
            RetryConfig::new()
                .with_max_attempts(max_attempts)
                .with_initial_delay(Duration::from_millis(10))
                .with_max_delay(Duration::from_millis(100)),
        )
        .unwrap();
        let breaker = CircuitBreaker::new(
            "ai",
            CircuitBreakerConfig::new(threshold, Duration::from_secs(60)),
        )
        .unwrap();
        let timeout =
            timeout_ms.map(|ms| TimeoutGuard::new("ai.parse", Duration::from_millis(ms)).unwrap());
        GuardedCall::new("ai", timeout, retry, Arc::new(breaker))
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_counts_attempts_and_one_success() {
        let guarded = call(3, 1, None);
        let mut remaining_failures = 2;

        let report: CallReport<&str, IngestError> = guarded
            .run(|| {
                let fail = remaining_failures > 0;
                remaining_failures -= 1;
                async move {
                    if fail {
                        Err(IngestError::transient("ai", "503"))
                    } else {
                        Ok("parsed")
                    }
                }
            })
            .await;

        assert_eq!(report.result.unwrap(), "parsed");
        assert_eq!(report.attempts, 3);
        // Threshold of one, yet the breaker stays closed: retries are invisible to it.
        assert_eq!(guarded.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_gets_its_own_deadline() {
        let guarded = call(2, 5, Some(50));
        let report: CallReport<(), IngestError> = guarded
            .run(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(report.result, Err(IngestError::Timeout(_))));
        assert_eq!(report.attempts, 2);
        assert_eq!(guarded.breaker().failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_operation() {
        let guarded = call(1, 1, None);
        let first: CallReport<(), IngestError> = guarded
            .run(|| async { Err(IngestError::transient("ai", "down")) })
            .await;
        assert_eq!(first.attempts, 1);

        let second: CallReport<(), IngestError> = guarded
            .run(|| async { Ok(()) })
            .await;
        assert!(matches!(second.result, Err(IngestError::CircuitOpen(_))));
        assert_eq!(second.attempts, 0);
    }
}
