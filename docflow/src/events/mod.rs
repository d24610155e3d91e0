//! Pipeline events for observability.
//!
//! The orchestrator, the retry policy and the circuit breakers report what
//! they do through an injected [`EventSink`]. Sinks are passed explicitly;
//! there is no process-wide default.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};

use std::sync::Arc;

/// Returns a shared sink that discards every event.
#[must_use]
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpEventSink)
}
