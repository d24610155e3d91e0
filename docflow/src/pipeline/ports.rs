//! Collaborators the orchestrator calls out to.
//!
//! Implementations classify their own failures by returning the matching
//! [`IngestError`] variant; the orchestrator never inspects messages.

use crate::core::{RecordId, StructuredFields, StructuredRecord};
use crate::errors::IngestError;
use async_trait::async_trait;

/// Turns uploaded bytes into plain text.
///
/// Failures are permanent: `UnsupportedFormat` or `CorruptDocument`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracts the text of a document.
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, IngestError>;
}

/// The AI service that structures extracted text.
///
/// Network failures and overload are `Transient`; an unusable answer is
/// `MalformedResponse`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AiParser: Send + Sync {
    /// Parses text into structured fields.
    async fn parse(&self, text: &str) -> Result<StructuredFields, IngestError>;
}

/// The storage backend for validated records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a record and returns its storage identifier.
    async fn persist(&self, record: &StructuredRecord) -> Result<RecordId, IngestError>;
}
