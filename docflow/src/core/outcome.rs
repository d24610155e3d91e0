//! Caller-facing results and the record handed to storage.

use super::{JobFailure, ProcessingJob, ProcessingStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Structured fields produced by the AI service.
pub type StructuredFields = serde_json::Map<String, serde_json::Value>;

/// Identifier assigned by the storage backend to a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Creates a record id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The validated record written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// The job that produced the record.
    pub job_id: Uuid,
    /// The owner of the source upload.
    pub owner_id: String,
    /// Original file name.
    pub filename: String,
    /// Declared MIME type of the source.
    pub content_type: String,
    /// SHA-256 digest of the source bytes.
    pub digest: String,
    /// The validated structured fields.
    pub fields: StructuredFields,
}

/// Processing metadata returned alongside a successful record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Original file name.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Size of the upload in bytes.
    pub size_bytes: usize,
    /// SHA-256 digest of the upload.
    pub digest: String,
    /// Length in characters of the extracted text.
    pub text_length: usize,
    /// Invocation counts of each guarded stage.
    pub attempts: BTreeMap<ProcessingStage, u32>,
    /// Wall time spent in the pipeline.
    pub duration_ms: f64,
}

/// Success payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedJob {
    /// The job identifier.
    pub job_id: Uuid,
    /// The storage identifier of the persisted record.
    pub record_id: RecordId,
    /// The persisted structured fields.
    pub structured_fields: StructuredFields,
    /// Processing metadata.
    pub metadata: JobMetadata,
}

/// Failure payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    /// The job identifier.
    pub job_id: Uuid,
    /// Kind, message and stage of the failure.
    pub failure: JobFailure,
    /// Validated fields, returned only when persistence was the stage that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_fields: Option<StructuredFields>,
}

/// The discriminated result of submitting a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every stage succeeded.
    Completed(CompletedJob),
    /// A stage failed.
    Failed(FailedJob),
}

impl JobOutcome {
    /// Returns true if the job completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the job identifier.
    #[must_use]
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::Completed(done) => done.job_id,
            Self::Failed(failed) => failed.job_id,
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failed) => Some(&failed.failure),
        }
    }

    /// Returns the success payload, if any.
    #[must_use]
    pub fn completed(&self) -> Option<&CompletedJob> {
        match self {
            Self::Completed(done) => Some(done),
            Self::Failed(_) => None,
        }
    }
}

/// A finished job together with the outcome reported to the caller.
#[derive(Debug, Clone)]
pub struct ProcessedJob {
    /// The job in its terminal state.
    pub job: ProcessingJob,
    /// The caller-facing result.
    pub outcome: JobOutcome,
}
