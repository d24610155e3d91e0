//! The processing job and its lifecycle rules.

use super::ProcessingStage;
use crate::errors::{Classify, ErrorKind, IngestError, JobStateError};
use crate::utils::{content_digest, generate_uuid_v7, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What a caller submits to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// The uploaded file contents.
    #[serde(skip)]
    pub raw_bytes: Vec<u8>,
    /// Original file name.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    /// The user or tenant that owns the upload.
    pub owner_id: String,
}

impl JobRequest {
    /// Creates a new job request.
    pub fn new(
        raw_bytes: impl Into<Vec<u8>>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            raw_bytes: raw_bytes.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// Why and where a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Classification of the final error.
    pub kind: ErrorKind,
    /// Human-readable message of the final error.
    pub message: String,
    /// The stage the job was in when it failed.
    pub stage: ProcessingStage,
    /// How many times the failing operation was invoked.
    pub attempts: u32,
    /// True when a retryable error survived every allowed attempt.
    pub retries_exhausted: bool,
    /// When the failure was recorded.
    pub failed_at: Timestamp,
}

impl JobFailure {
    /// Builds a failure record from the error that ended a stage.
    #[must_use]
    pub fn from_error(
        error: &IngestError,
        stage: ProcessingStage,
        attempts: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            stage,
            attempts,
            retries_exhausted: error.is_retryable() && attempts >= max_attempts,
            failed_at: now_utc(),
        }
    }
}

/// A single document moving through the ingestion pipeline.
///
/// Only the orchestrator mutates a job. Stage changes go through
/// [`ProcessingJob::advance`] and [`ProcessingJob::fail`], which refuse to
/// move backwards or to touch a job that is already terminal.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingJob {
    id: Uuid,
    owner_id: String,
    #[serde(skip)]
    raw_bytes: Vec<u8>,
    filename: String,
    content_type: String,
    digest: String,
    stage: ProcessingStage,
    failure: Option<JobFailure>,
    stage_entered_at: BTreeMap<ProcessingStage, Timestamp>,
    attempts: BTreeMap<ProcessingStage, u32>,
}

impl ProcessingJob {
    /// Creates a job in the `Received` stage.
    #[must_use]
    pub fn new(request: JobRequest) -> Self {
        let digest = content_digest(&request.raw_bytes);
        let mut stage_entered_at = BTreeMap::new();
        stage_entered_at.insert(ProcessingStage::Received, now_utc());

        Self {
            id: generate_uuid_v7(),
            owner_id: request.owner_id,
            raw_bytes: request.raw_bytes,
            filename: request.filename,
            content_type: request.content_type,
            digest,
            stage: ProcessingStage::Received,
            failure: None,
            stage_entered_at,
            attempts: BTreeMap::new(),
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owner identifier.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Returns the uploaded bytes.
    #[must_use]
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Returns the original file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the declared content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the SHA-256 digest of the uploaded bytes.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Returns the current stage.
    #[must_use]
    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Returns the failure, if the job failed.
    #[must_use]
    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    /// Returns when the job entered a stage, if it did.
    #[must_use]
    pub fn entered_at(&self, stage: ProcessingStage) -> Option<Timestamp> {
        self.stage_entered_at.get(&stage).copied()
    }

    /// Returns how many times a stage's operation was invoked.
    #[must_use]
    pub fn attempts(&self, stage: ProcessingStage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }

    /// Returns all recorded attempt counts keyed by stage.
    #[must_use]
    pub fn all_attempts(&self) -> &BTreeMap<ProcessingStage, u32> {
        &self.attempts
    }

    /// Returns true once the job is `Completed` or `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Moves the job forward to `next`.
    pub fn advance(&mut self, next: ProcessingStage) -> Result<(), JobStateError> {
        self.check_transition(next)?;
        self.stage = next;
        self.stage_entered_at.insert(next, now_utc());
        Ok(())
    }

    /// Records how many invocations a stage's operation took.
    pub fn record_attempts(
        &mut self,
        stage: ProcessingStage,
        attempts: u32,
    ) -> Result<(), JobStateError> {
        self.ensure_mutable()?;
        self.attempts.insert(stage, attempts);
        Ok(())
    }

    /// Moves the job into `Failed`, keeping the failure record.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), JobStateError> {
        self.check_transition(ProcessingStage::Failed)?;
        self.stage = ProcessingStage::Failed;
        self.stage_entered_at.insert(ProcessingStage::Failed, failure.failed_at);
        self.failure = Some(failure);
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), JobStateError> {
        if self.stage.is_terminal() {
            return Err(JobStateError::Terminal {
                job_id: self.id.to_string(),
                stage: self.stage,
            });
        }
        Ok(())
    }

    fn check_transition(&self, next: ProcessingStage) -> Result<(), JobStateError> {
        self.ensure_mutable()?;
        if !self.stage.can_advance_to(next) {
            return Err(JobStateError::Backwards {
                job_id: self.id.to_string(),
                from: self.stage,
                to: next,
            });
        }
        Ok(())
    }
}
