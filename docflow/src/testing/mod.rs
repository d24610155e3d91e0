//! Testing utilities for the ingestion pipeline.
//!
//! This module provides:
//! - Scripted extractor, parser and store implementations
//! - Fixture requests, payloads and fast configurations
//! - Assertions on job outcomes

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_completed, assert_failed_at};
pub use fixtures::{fast_config, fast_resilience, invoice_fields, invoice_request, invoice_schema};
pub use mocks::{ScriptedExtractor, ScriptedParser, ScriptedStore};
