//! Deadline enforcement for a single asynchronous operation.

use crate::cancellation::CancellationToken;
use crate::errors::{ConfigError, TimeoutElapsed};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Runs a future with a deadline.
///
/// On expiry the future is dropped and a [`TimeoutElapsed`] is returned in
/// place of whatever the operation would have produced. Work the future
/// spawned elsewhere is not stopped; use [`TimeoutGuard::run_cancellable`]
/// when that matters.
pub async fn run_with_timeout<T, E, F>(
    operation: &str,
    duration: Duration,
    future: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutElapsed>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation,
                timeout_ms = duration.as_millis() as u64,
                "Operation exceeded deadline"
            );
            Err(TimeoutElapsed::new(operation, duration).into())
        }
    }
}

/// A reusable deadline for one named operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutGuard {
    operation: String,
    duration: Duration,
}

impl TimeoutGuard {
    /// Creates a guard. The duration must be non-zero.
    pub fn new(operation: impl Into<String>, duration: Duration) -> Result<Self, ConfigError> {
        let operation = operation.into();
        if duration.is_zero() {
            return Err(ConfigError::invalid(
                format!("{operation}.timeout"),
                "duration must be greater than zero",
            ));
        }
        Ok(Self {
            operation,
            duration,
        })
    }

    /// Returns the guarded operation's name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the deadline.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Runs `future` under this guard's deadline.
    pub async fn run<T, E, F>(&self, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<TimeoutElapsed>,
    {
        run_with_timeout(&self.operation, self.duration, future).await
    }

    /// Runs an operation that receives a token cancelled at the deadline.
    ///
    /// The guard still reports the timeout on schedule; the token only lets
    /// detached work notice that nobody is waiting for it any more.
    pub async fn run_cancellable<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(Arc<CancellationToken>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TimeoutElapsed>,
    {
        let token = Arc::new(CancellationToken::new());
        match timeout(self.duration, operation(token.clone())).await {
            Ok(result) => result,
            Err(_) => {
                token.cancel(format!(
                    "{} exceeded deadline of {:?}",
                    self.operation, self.duration
                ));
                warn!(
                    operation = %self.operation,
                    timeout_ms = self.duration.as_millis() as u64,
                    "Operation exceeded deadline, cancellation requested"
                );
                Err(TimeoutElapsed::new(self.operation.clone(), self.duration).into())
            }
        }
    }
}
