//! Assertions for job outcomes.

use crate::core::{CompletedJob, JobFailure, JobOutcome, ProcessingStage};
use crate::errors::ErrorKind;

/// Asserts that the job completed and returns the success payload.
pub fn assert_completed(outcome: &JobOutcome) -> &CompletedJob {
    match outcome {
        JobOutcome::Completed(done) => done,
        JobOutcome::Failed(failed) => panic!(
            "Expected completed job, got failure at {} ({}): {}",
            failed.failure.stage, failed.failure.kind, failed.failure.message
        ),
    }
}

/// Asserts that the job failed at `stage` with `kind` and returns the failure.
pub fn assert_failed_at(
    outcome: &JobOutcome,
    stage: ProcessingStage,
    kind: ErrorKind,
) -> &JobFailure {
    let Some(failure) = outcome.failure() else {
        panic!("Expected failure at {stage}, got completed job");
    };
    assert_eq!(
        (failure.stage, failure.kind),
        (stage, kind),
        "Unexpected failure: {}",
        failure.message
    );
    failure
}
