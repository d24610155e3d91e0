//! Event sink trait and implementations.

use crate::core::ProcessingStage;
use crate::errors::ErrorKind;
use crate::resilience::CircuitState;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// Something observable that happened while processing a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A job entered a stage.
    StageEntered {
        /// The job.
        job_id: Uuid,
        /// The stage entered.
        stage: ProcessingStage,
    },
    /// A failed attempt will be retried after a delay.
    RetryScheduled {
        /// The retried operation.
        operation: String,
        /// The attempt that just failed (1-based).
        attempt: u32,
        /// The computed backoff before the next attempt.
        delay_ms: u64,
        /// Classification of the failure.
        kind: ErrorKind,
    },
    /// A circuit breaker changed state.
    BreakerTransition {
        /// The breaker name.
        breaker: String,
        /// Previous state.
        from: CircuitState,
        /// New state.
        to: CircuitState,
    },
    /// A job finished every stage.
    JobCompleted {
        /// The job.
        job_id: Uuid,
        /// Storage identifier of the record.
        record_id: String,
        /// Time spent in the pipeline.
        duration_ms: f64,
    },
    /// A job failed.
    JobFailed {
        /// The job.
        job_id: Uuid,
        /// The stage that failed.
        stage: ProcessingStage,
        /// Classification of the failure.
        kind: ErrorKind,
    },
}

impl PipelineEvent {
    /// Returns the dotted event name (e.g. `retry.scheduled`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StageEntered { .. } => "job.stage_entered",
            Self::RetryScheduled { .. } => "retry.scheduled",
            Self::BreakerTransition { .. } => "breaker.transition",
            Self::JobCompleted { .. } => "job.completed",
            Self::JobFailed { .. } => "job.failed",
        }
    }
}

/// Receives pipeline events.
///
/// `emit` is called inline on the hot path and must not block or panic.
pub trait EventSink: Send + Sync {
    /// Records an event.
    fn emit(&self, event: &PipelineEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(event_type = event.name(), event_data = %payload, "Event: {}", event.name());
        } else {
            info!(event_type = event.name(), event_data = %payload, "Event: {}", event.name());
        }
    }
}

/// A sink that keeps every event in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events whose name starts with `prefix`.
    #[must_use]
    pub fn events_named(&self, prefix: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.name().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}
