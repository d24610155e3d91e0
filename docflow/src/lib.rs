//! # Docflow
//!
//! Resilient document ingestion: an uploaded file is turned into a validated,
//! persisted structured record while the unreliable services on the way are
//! kept behind deadlines, bounded retries and circuit breakers.
//!
//! - **Resilience primitives**: [`TimeoutGuard`](resilience::TimeoutGuard),
//!   [`RetryPolicy`](resilience::RetryPolicy) and
//!   [`CircuitBreaker`](resilience::CircuitBreaker), composed per dependency by
//!   [`GuardedCall`](resilience::GuardedCall)
//! - **Processing orchestrator**: receive, extract, AI parse, validate, persist
//! - **Typed failures**: every error reports a timeout, transient, permanent or
//!   circuit-open kind, and every job ends in a discriminated outcome
//! - **Observability**: structured `tracing` logs and an injectable event sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//!
//! let orchestrator = ProcessingOrchestrator::builder(extractor, parser, store)
//!     .config(IngestConfig::load(None)?)
//!     .schema(schema)
//!     .build()?;
//!
//! match orchestrator.submit(request).await {
//!     JobOutcome::Completed(done) => println!("stored as {}", done.record_id),
//!     JobOutcome::Failed(failed) => eprintln!("failed at {}", failed.failure.stage),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod settings;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{
        CompletedJob, FailedJob, JobFailure, JobOutcome, JobRequest, ProcessingStage, RecordId,
        StructuredFields, StructuredRecord,
    };
    pub use crate::errors::{
        CircuitOpenError, Classify, ConfigError, ErrorKind, IngestError, TimeoutElapsed,
        ValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        AiParser, FieldRule, FieldType, ProcessingOrchestrator, RecordSchema, RecordStore,
        TextExtractor,
    };
    pub use crate::resilience::{
        BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState, GuardedCall,
        RetryConfig, RetryPolicy, TimeoutGuard,
    };
    pub use crate::settings::{IngestConfig, LoggingConfig, ResilienceConfig};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
