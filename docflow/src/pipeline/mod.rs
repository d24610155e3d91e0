//! The document ingestion pipeline.
//!
//! This module provides:
//! - Collaborator traits for text extraction, AI parsing and storage
//! - Record schemas for the validation stage
//! - The processing orchestrator that drives a job through every stage

mod orchestrator;
mod ports;
mod validation;


pub use orchestrator::{OrchestratorBuilder, ProcessingOrchestrator, AI_SERVICE, STORAGE};
pub use ports::{AiParser, RecordStore, TextExtractor};
pub use validation::{FieldRule, FieldType, RecordSchema};

#[cfg(test)]
pub use ports::{MockAiParser, MockRecordStore, MockTextExtractor};
