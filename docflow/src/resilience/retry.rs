//! Bounded retry with exponential backoff.
//!
//! Failures are classified by [`ErrorKind`] at the raise site. A kind listed
//! in the permanent set fails fast; every other kind is retried until the
//! attempt budget runs out.

use crate::errors::{Classify, ConfigError, ErrorKind};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Jitter applied on top of the computed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Sleep exactly the computed delay.
    #[default]
    None,
    /// Random from 0 to the computed delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay. The result never exceeds `delay`.
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        if millis == 0 {
            return delay;
        }
        let mut rng = rand::thread_rng();
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(rng.gen_range(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rng.gen_range(0..=millis - half))
            }
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total invocations allowed, including the first.
    pub max_attempts: u32,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Kinds expected to be retried. Kinds in neither set are retried too.
    pub retryable: HashSet<ErrorKind>,
    /// Kinds that are never retried.
    pub permanent: HashSet<ErrorKind>,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_multiplier: 2.0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retryable: [ErrorKind::Transient, ErrorKind::Timeout].into_iter().collect(),
            permanent: [ErrorKind::Permanent, ErrorKind::CircuitOpen]
                .into_iter()
                .collect(),
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replaces the permanent kind set.
    #[must_use]
    pub fn with_permanent(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.permanent = kinds.into_iter().collect();
        self
    }

    /// Replaces the retryable kind set.
    #[must_use]
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::invalid("max_attempts", "must be >= 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier", "must be > 1"));
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigError::invalid(
                "initial_delay",
                "must not exceed max_delay",
            ));
        }
        if let Some(kind) = self.retryable.intersection(&self.permanent).next() {
            return Err(ConfigError::invalid(
                "permanent",
                format!("'{kind}' is listed as both retryable and permanent"),
            ));
        }
        Ok(())
    }

    /// Deterministic backoff after the given failed attempt (1-based).
    ///
    /// `min(max_delay, initial_delay * backoff_multiplier^(attempt - 1))`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let max = self.max_delay.as_secs_f64();
        let raw = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = if raw.is_finite() { raw.clamp(0.0, max) } else { max };
        Duration::from_secs_f64(capped)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// The attempt budget is spent.
    GiveUp,
    /// The failure is in the permanent set.
    NotRetryable,
}

/// A validated retry configuration plus where to report retries.
#[derive(Clone)]
pub struct RetryPolicy {
    name: String,
    config: RetryConfig,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl RetryPolicy {
    /// Creates a policy for the named operation.
    pub fn new(name: impl Into<String>, config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            events: Arc::new(NoOpEventSink),
        })
    }

    /// Reports each scheduled retry to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decides what to do after `attempt` (1-based) failed with `kind`.
    #[must_use]
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if self.config.permanent.contains(&kind) {
            return RetryDecision::NotRetryable;
        }
        if attempt >= self.config.max_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = self.config.delay_for_attempt(attempt);
        RetryDecision::Retry(self.config.jitter.apply(delay))
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. The closure receives the 1-based attempt number.
    ///
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt = 1;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let kind = error.kind();
            match self.decide(attempt, kind) {
                RetryDecision::Retry(delay) => {
                    if !self.config.retryable.contains(&kind) {
                        debug!(
                            operation = %self.name,
                            %kind,
                            "Retrying a kind outside the retryable set"
                        );
                    }
                    warn!(
                        operation = %self.name,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after error"
                    );
                    self.events.emit(&PipelineEvent::RetryScheduled {
                        operation: self.name.clone(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        kind,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    warn!(
                        operation = %self.name,
                        attempts = attempt,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(error);
                }
                RetryDecision::NotRetryable => {
                    debug!(
                        operation = %self.name,
                        attempt,
                        %kind,
                        "Failure is not retryable"
                    );
                    return Err(error);
                }
            }
        }
    }
}
