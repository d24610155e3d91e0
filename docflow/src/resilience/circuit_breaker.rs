//! Circuit breaker for one external dependency.
//!
//! ```text
//! Closed   -> Open      failure_count >= failure_threshold
//! Open     -> HalfOpen  next call after recovery_timeout has elapsed
//! HalfOpen -> Closed    the trial call succeeds
//! HalfOpen -> Open      the trial call fails
//! ```
//!
//! A breaker is shared by every job that talks to the same dependency, so all
//! reads and writes of its state happen under one mutex. The only way to
//! change state is to report the outcome of a call admitted by
//! [`CircuitBreaker::acquire`]; [`CircuitBreaker::execute`] is built on it.

use crate::errors::{CircuitOpenError, ConfigError};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::utils::{now_utc, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls are forwarded.
    Closed,
    /// Failing fast - calls are rejected without reaching the dependency.
    Open,
    /// Testing recovery - a single trial call is in flight.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a config.
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold", "must be > 0"));
        }
        Ok(())
    }
}

/// Point-in-time view of a breaker, read under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures counted since the circuit last closed.
    pub failure_count: u32,
    /// When the last failure was recorded.
    pub last_failure_time: Option<Timestamp>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Timestamp>,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            last_failure_at: None,
            trial_in_flight: false,
        }
    }
}

/// A shared failure governor for one dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );
        Ok(Self {
            name,
            config,
            inner: Mutex::new(BreakerState::closed()),
            events: Arc::new(NoOpEventSink),
        })
    }

    /// Reports state transitions to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns the failures counted since the circuit last closed.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Returns when the last failure was recorded.
    #[must_use]
    pub fn last_failure_time(&self) -> Option<Timestamp> {
        self.inner.lock().last_failure_time
    }

    /// Returns all observable fields read under a single lock.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Admits one call, or rejects it with [`CircuitOpenError`].
    ///
    /// The returned permit must be completed with the call's outcome. A
    /// permit dropped without an outcome counts as a failure.
    pub fn acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();
        let transition = match inner.state {
            CircuitState::Closed => return Ok(BreakerPermit::new(self, false)),
            CircuitState::Open => {
                let recovered = inner
                    .last_failure_at
                    .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
                if !recovered {
                    return Err(self.rejection(&inner));
                }
                self.transition(&mut inner, CircuitState::HalfOpen)
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.rejection(&inner));
                }
                None
            }
        };
        inner.trial_in_flight = true;
        drop(inner);

        self.emit_transition(transition);
        Ok(BreakerPermit::new(self, true))
    }

    /// Runs `operation` if the breaker admits it and records the outcome.
    ///
    /// While open, the operation is not invoked and the rejection is
    /// returned as `E`.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let permit = self.acquire()?;
        let result = operation().await;
        permit.complete(result.is_ok());
        result
    }

    fn rejection(&self, inner: &BreakerState) -> CircuitOpenError {
        debug!(
            component = %self.name,
            state = %inner.state,
            failure_count = inner.failure_count,
            "Call rejected by circuit breaker"
        );
        CircuitOpenError::new(&self.name, inner.failure_count, inner.last_failure_time)
    }

    fn record_outcome(&self, trial: bool, success: bool) {
        let mut inner = self.inner.lock();

        let transition = if trial {
            inner.trial_in_flight = false;
            if success {
                inner.failure_count = 0;
                self.transition(&mut inner, CircuitState::Closed)
            } else {
                Self::record_failure(&mut inner);
                self.transition(&mut inner, CircuitState::Open)
            }
        } else {
            match (inner.state, success) {
                (CircuitState::Closed, true) => {
                    inner.failure_count = 0;
                    None
                }
                (CircuitState::Closed, false) => {
                    Self::record_failure(&mut inner);
                    if inner.failure_count >= self.config.failure_threshold {
                        self.transition(&mut inner, CircuitState::Open)
                    } else {
                        None
                    }
                }
                // A call admitted while closed finished after the circuit opened.
                (_, false) => {
                    Self::record_failure(&mut inner);
                    None
                }
                (_, true) => None,
            }
        };
        drop(inner);

        self.emit_transition(transition);
    }

    fn record_failure(inner: &mut BreakerState) {
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(now_utc());
        inner.last_failure_at = Some(Instant::now());
    }

    /// Changes state under the caller's lock. The returned pair must be passed
    /// to [`Self::emit_transition`] once the lock is released, since sinks may
    /// read the breaker.
    fn transition(
        &self,
        inner: &mut BreakerState,
        to: CircuitState,
    ) -> Option<(CircuitState, CircuitState)> {
        let from = inner.state;
        if from == to {
            return None;
        }
        inner.state = to;
        if to == CircuitState::Closed {
            inner.failure_count = 0;
        }

        match to {
            CircuitState::Open => error!(
                component = %self.name,
                failure_count = inner.failure_count,
                failure_threshold = self.config.failure_threshold,
                recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                "Circuit breaker opened (failing fast)"
            ),
            CircuitState::HalfOpen => info!(
                component = %self.name,
                "Circuit breaker half-open (testing recovery)"
            ),
            CircuitState::Closed => info!(
                component = %self.name,
                "Circuit breaker closed (recovered)"
            ),
        }
        Some((from, to))
    }

    fn emit_transition(&self, transition: Option<(CircuitState, CircuitState)>) {
        if let Some((from, to)) = transition {
            self.events.emit(&PipelineEvent::BreakerTransition {
                breaker: self.name.clone(),
                from,
                to,
            });
        }
    }
}

/// Admission to call the protected dependency once.
///
/// This is the scoped form of [`CircuitBreaker::execute`]: acquire, call,
/// then [`complete`](Self::complete) with the outcome.
#[must_use = "a permit dropped without an outcome is recorded as a failure"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    completed: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            completed: false,
        }
    }

    /// Returns true if this permit is the half-open trial call.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Records the outcome of the admitted call.
    pub fn complete(mut self, success: bool) {
        self.completed = true;
        self.breaker.record_outcome(self.trial, success);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                component = %self.breaker.name,
                trial = self.trial,
                "Breaker permit dropped without an outcome, recording failure"
            );
            self.breaker.record_outcome(self.trial, false);
        }
    }
}

impl fmt::Debug for BreakerPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("breaker", &self.breaker.name)
            .field("trial", &self.trial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IngestError;
    use crate::events::CollectingEventSink;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "storage",
            CircuitBreakerConfig::new(threshold, Duration::from_millis(recovery_ms)),
        )
        .unwrap()
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), IngestError> {
        breaker
            .execute(|| async { Err(IngestError::transient("storage", "reset")) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), IngestError> {
        breaker.execute(|| async { Ok(()) }).await
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = CircuitBreaker::new("x", CircuitBreakerConfig::new(0, Duration::ZERO));
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_closed() {
        let b = breaker(3, 1000);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
        assert!(b.last_failure_time().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let b = breaker(3, 1000);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        assert_eq!(b.failure_count(), 2);

        succeed(&b).await.unwrap();
        assert_eq!(b.failure_count(), 0);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let b = breaker(3, 1000);
        for _ in 0..3 {
            assert!(matches!(fail(&b).await, Err(IngestError::Transient { .. })));
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.failure_count(), 3);
        assert!(b.last_failure_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking() {
        let b = breaker(1, 1000);
        let _ = fail(&b).await;

        let calls = AtomicU32::new(0);
        let result: Result<(), IngestError> = b
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        match result {
            Err(IngestError::CircuitOpen(open)) => {
                assert_eq!(open.breaker, "storage");
                assert_eq!(open.failure_count, 1);
                assert_eq!(open.last_failure_time, b.last_failure_time());
            }
            other => panic!("expected circuit open, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let b = breaker(2, 100);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(100)).await;

        let permit = b.acquire().unwrap();
        assert!(permit.is_trial());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        permit.complete(true);

        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens_and_refreshes_time() {
        let b = breaker(1, 100);
        let _ = fail(&b).await;
        let first_failure = b.last_failure_time().unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        std::thread::sleep(Duration::from_millis(2));

        assert!(matches!(fail(&b).await, Err(IngestError::Transient { .. })));
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.last_failure_time().unwrap() > first_failure);

        // The recovery window restarts from the refreshed failure.
        assert!(matches!(succeed(&b).await, Err(IngestError::CircuitOpen(_))));
        tokio::time::advance(Duration::from_millis(100)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_open_inside_recovery_window() {
        let b = breaker(1, 100);
        let _ = fail(&b).await;
        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(matches!(succeed(&b).await, Err(IngestError::CircuitOpen(_))));
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_trial_at_a_time() {
        let b = breaker(1, 10);
        let _ = fail(&b).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let trial = tokio_test::assert_ok!(b.acquire());
        tokio_test::assert_err!(b.acquire());
        assert_eq!(b.state(), CircuitState::HalfOpen);

        trial.complete(true);
        tokio_test::assert_ok!(b.acquire()).complete(true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_during_recovery_get_one_trial() {
        let b = breaker(1, 10);
        let _ = fail(&b).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let calls = AtomicU32::new(0);
        let (b, calls) = (&b, &calls);
        let results = futures::future::join_all((0..5).map(|_| {
            b.execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, IngestError>(())
            })
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(IngestError::CircuitOpen(_))))
                .count(),
            4
        );
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_counts_as_failure() {
        let b = breaker(1, 10);
        {
            let _permit = b.acquire().unwrap();
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_are_reported() {
        let sink = Arc::new(CollectingEventSink::new());
        let b = breaker(1, 10).with_event_sink(sink.clone());

        let _ = fail(&b).await;
        tokio::time::advance(Duration::from_millis(10)).await;
        succeed(&b).await.unwrap();

        let transitions: Vec<(CircuitState, CircuitState)> = sink
            .events_named("breaker.")
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::BreakerTransition { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    /// Reads the breaker back from inside `emit`.
    #[derive(Default)]
    struct SnapshottingSink {
        breaker: parking_lot::Mutex<Option<Arc<CircuitBreaker>>>,
        seen: parking_lot::Mutex<Vec<CircuitState>>,
    }

    impl EventSink for SnapshottingSink {
        fn emit(&self, _event: &PipelineEvent) {
            let breaker = self.breaker.lock().clone();
            if let Some(breaker) = breaker {
                self.seen.lock().push(breaker.snapshot().state);
            }
        }
    }

    #[test]
    fn test_sink_can_read_breaker_during_transition() {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let seen = runtime.block_on(async {
                let sink = Arc::new(SnapshottingSink::default());
                let b = Arc::new(breaker(1, 10).with_event_sink(sink.clone()));
                *sink.breaker.lock() = Some(b.clone());

                let _ = fail(&b).await;
                tokio::time::advance(Duration::from_millis(10)).await;
                succeed(&b).await.unwrap();

                sink.breaker.lock().take();
                let seen = sink.seen.lock().clone();
                seen
            });
            let _ = tx.send(seen);
        });

        let seen = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("breaker deadlocked while emitting a transition");
        assert_eq!(
            seen,
            vec![
                CircuitState::Open,
                CircuitState::HalfOpen,
                CircuitState::Closed
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_not_lost() {
        let b = Arc::new(breaker(1000, 60_000));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let _ = fail(&b).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(b.failure_count(), 500);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_snapshot() {
        let b = breaker(3, 1000);
        let snapshot = b.snapshot();
        assert_eq!(
            snapshot,
            BreakerSnapshot {
                name: "storage".to_string(),
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }
        );
    }
}
