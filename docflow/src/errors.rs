//! Error types for the docflow ingestion pipeline.
//!
//! Every failure is tagged with an [`ErrorKind`] when it is constructed, so
//! the retry policy and the orchestrator never need to inspect concrete types
//! to decide whether a failure is worth another attempt.

use crate::core::ProcessingStage;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Closed classification of every failure the pipeline can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A deadline was exceeded.
    Timeout,
    /// A temporary failure (network, storage connectivity) worth retrying.
    Transient,
    /// A failure that retrying cannot fix.
    Permanent,
    /// The dependency is judged unhealthy and the call was not attempted.
    CircuitOpen,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}

/// Errors that know their own [`ErrorKind`].
pub trait Classify {
    /// Returns the classification decided when the error was raised.
    fn kind(&self) -> ErrorKind;
}

/// Raised by the timeout guard when an operation misses its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{operation}' exceeded its deadline of {duration:?}")]
pub struct TimeoutElapsed {
    /// Name of the guarded operation.
    pub operation: String,
    /// The deadline that was exceeded.
    pub duration: Duration,
}

impl TimeoutElapsed {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(operation: impl Into<String>, duration: Duration) -> Self {
        Self {
            operation: operation.into(),
            duration,
        }
    }
}

/// Raised by a circuit breaker that refuses to forward a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{breaker}' is open ({failure_count} failures, last at {last_failure_display})")]
pub struct CircuitOpenError {
    /// Name of the breaker (the guarded dependency).
    pub breaker: String,
    /// Failure count at the time of rejection.
    pub failure_count: u32,
    /// When the breaker last recorded a failure.
    pub last_failure_time: Option<Timestamp>,
    last_failure_display: String,
}

impl CircuitOpenError {
    /// Creates a new circuit-open error.
    #[must_use]
    pub fn new(
        breaker: impl Into<String>,
        failure_count: u32,
        last_failure_time: Option<Timestamp>,
    ) -> Self {
        let last_failure_display = last_failure_time
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
        Self {
            breaker: breaker.into(),
            failure_count,
            last_failure_time,
            last_failure_display,
        }
    }
}

/// A single violated rule found while validating a structured record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

/// Raised when parsed fields do not match the expected record shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record failed validation: {}", summarize(.violations))]
pub struct ValidationError {
    /// All violations found, in schema order.
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Creates a validation error from a list of violations.
    #[must_use]
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// Returns the names of all offending fields.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The main error type for pipeline operations and collaborators.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// A guarded operation timed out.
    #[error(transparent)]
    Timeout(#[from] TimeoutElapsed),

    /// A circuit breaker rejected the call.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// A temporary failure from an external dependency.
    #[error("transient failure in {source_name}: {message}")]
    Transient {
        /// The dependency that failed.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// The document format cannot be extracted.
    #[error("unsupported document format: {content_type}")]
    UnsupportedFormat {
        /// The rejected content type.
        content_type: String,
    },

    /// The document bytes are unreadable.
    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    /// The AI service answered with something unusable.
    #[error("malformed response from AI service: {0}")]
    MalformedResponse(String),

    /// The structured record does not match the expected shape.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Any other failure that retrying cannot fix.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The storage backend could not be reached.
    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl IngestError {
    /// Creates a transient error attributed to a dependency.
    #[must_use]
    pub fn transient(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-format error.
    #[must_use]
    pub fn unsupported_format(content_type: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            content_type: content_type.into(),
        }
    }

    /// Creates a corrupt-document error.
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptDocument(message.into())
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Creates a storage connectivity error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a generic permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    /// Returns true if a retry could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Transient)
    }
}

impl Classify for IngestError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Self::Transient { .. } | Self::Storage(_) => ErrorKind::Transient,
            Self::UnsupportedFormat { .. }
            | Self::CorruptDocument(_)
            | Self::MalformedResponse(_)
            | Self::Validation(_)
            | Self::Permanent(_) => ErrorKind::Permanent,
        }
    }
}

/// Raised when something tries to move a job backwards or touch a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStateError {
    /// The job already reached `Completed` or `Failed`.
    #[error("job {job_id} is already terminal ({stage})")]
    Terminal {
        /// The job identifier.
        job_id: String,
        /// The terminal stage.
        stage: ProcessingStage,
    },

    /// The requested stage does not come after the current one.
    #[error("job {job_id} cannot move from {from} to {to}")]
    Backwards {
        /// The job identifier.
        job_id: String,
        /// Current stage.
        from: ProcessingStage,
        /// Requested stage.
        to: ProcessingStage,
    },
}

/// Raised when configuration cannot be loaded or is out of range.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("invalid configuration for '{field}': {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The layered loader failed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A validation pattern in a record schema is not a valid regex.
    #[error("invalid pattern for field '{field}': {source}")]
    Pattern {
        /// The field the pattern belongs to.
        field: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(ErrorKind::CircuitOpen.to_string(), "circuit_open");
    }

    #[test]
    fn test_error_kind_serialize() {
        let json = serde_json::to_string(&ErrorKind::CircuitOpen).unwrap();
        assert_eq!(json, r#""circuit_open""#);
    }

    #[test]
    fn test_classification_at_raise_site() {
        assert_eq!(
            IngestError::transient("ai", "connection reset").kind(),
            ErrorKind::Transient
        );
        assert_eq!(IngestError::corrupt("bad xref").kind(), ErrorKind::Permanent);
        assert_eq!(
            IngestError::unsupported_format("image/x-foo").kind(),
            ErrorKind::Permanent
        );
        assert_eq!(IngestError::malformed("not json").kind(), ErrorKind::Permanent);
        assert!(IngestError::storage("connection refused").is_retryable());

        let timeout: IngestError = TimeoutElapsed::new("ai.parse", Duration::from_secs(1)).into();
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.is_retryable());

        let open: IngestError = CircuitOpenError::new("storage", 3, None).into();
        assert_eq!(open.kind(), ErrorKind::CircuitOpen);
        assert!(!open.is_retryable());
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = TimeoutElapsed::new("ai.parse", Duration::from_millis(250));
        let message = err.to_string();
        assert!(message.contains("ai.parse"));
        assert!(message.contains("250ms"));
    }

    #[test]
    fn test_circuit_open_message() {
        let err = CircuitOpenError::new("storage", 3, None);
        assert!(err.to_string().contains("never"));

        let now = Utc::now();
        let err = CircuitOpenError::new("storage", 5, Some(now));
        assert_eq!(err.last_failure_time, Some(now));
        assert!(err.to_string().contains("5 failures"));
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let err = ValidationError::new(vec![
            FieldViolation {
                field: "invoice_number".to_string(),
                reason: "missing required field".to_string(),
            },
            FieldViolation {
                field: "total".to_string(),
                reason: "expected number".to_string(),
            },
        ]);
        assert_eq!(err.fields(), vec!["invoice_number", "total"]);
        assert!(err.to_string().contains("invoice_number: missing required field"));
    }
}
