//! Core domain model types for docflow.
//!
//! This module contains the job-level types the orchestrator works with:
//! - The pipeline stage enum
//! - The mutable-until-terminal processing job
//! - The caller-facing outcome and persisted record types

mod job;
mod outcome;
mod status;

pub use job::{JobFailure, JobRequest, ProcessingJob};
pub use outcome::{
    CompletedJob, FailedJob, JobMetadata, JobOutcome, ProcessedJob, RecordId, StructuredFields,
    StructuredRecord,
};
pub use status::ProcessingStage;
