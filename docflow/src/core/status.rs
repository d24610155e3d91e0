//! Pipeline stage enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stage a processing job is currently in.
///
/// Variants are declared in pipeline order; `Failed` is the only stage a job
/// may enter out of order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// The upload was accepted.
    #[default]
    Received,
    /// Text is being extracted from the raw bytes.
    Extracting,
    /// The AI service is turning text into structured fields.
    Parsing,
    /// Structured fields are checked against the record schema.
    Validating,
    /// The record is being written to storage.
    Storing,
    /// Every stage succeeded.
    Completed,
    /// A stage failed; see the job's failure.
    Failed,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Extracting => write!(f, "extracting"),
            Self::Parsing => write!(f, "parsing"),
            Self::Validating => write!(f, "validating"),
            Self::Storing => write!(f, "storing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl ProcessingStage {
    /// Returns true once the job can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_advance_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next > *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(ProcessingStage::Received.to_string(), "received");
        assert_eq!(ProcessingStage::Parsing.to_string(), "parsing");
        assert_eq!(ProcessingStage::Failed.to_string(), "failed");
    }

    #[test]
    fn test_stage_default_is_received() {
        assert_eq!(ProcessingStage::default(), ProcessingStage::Received);
    }

    #[test]
    fn test_stage_is_terminal() {
        assert!(ProcessingStage::Completed.is_terminal());
        assert!(ProcessingStage::Failed.is_terminal());
        assert!(!ProcessingStage::Storing.is_terminal());
        assert!(!ProcessingStage::Received.is_terminal());
    }

    #[test]
    fn test_stage_only_advances_forward() {
        assert!(ProcessingStage::Received.can_advance_to(ProcessingStage::Extracting));
        assert!(ProcessingStage::Parsing.can_advance_to(ProcessingStage::Failed));
        assert!(!ProcessingStage::Validating.can_advance_to(ProcessingStage::Parsing));
        assert!(!ProcessingStage::Storing.can_advance_to(ProcessingStage::Storing));
        assert!(!ProcessingStage::Completed.can_advance_to(ProcessingStage::Failed));
        assert!(!ProcessingStage::Failed.can_advance_to(ProcessingStage::Completed));
    }

    #[test]
    fn test_stage_serialize() {
        let json = serde_json::to_string(&ProcessingStage::Validating).unwrap();
        assert_eq!(json, r#""validating""#);

        let back: ProcessingStage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProcessingStage::Validating);
    }
}
