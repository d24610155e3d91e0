//! Ready-made requests, payloads and configurations.

use serde_json::json;

use crate::core::{JobRequest, StructuredFields};
use crate::pipeline::{FieldRule, FieldType, RecordSchema};
use crate::settings::{IngestConfig, ResilienceConfig};

/// A small PDF upload.
#[must_use]
pub fn invoice_request() -> JobRequest {
    JobRequest::new(
        b"%PDF-1.7 invoice INV-1001 total 120.50".to_vec(),
        "invoice.pdf",
        "application/pdf",
        "owner-1",
    )
}

/// Fields a well-behaved AI service returns for [`invoice_request`].
#[must_use]
pub fn invoice_fields() -> StructuredFields {
    let value = json!({
        "invoice_number": "INV-1001",
        "vendor": "Acme Corp",
        "total": 120.5,
        "line_items": [{"description": "Widgets", "amount": 120.5}],
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => StructuredFields::new(),
    }
}

/// Schema matching [`invoice_fields`].
#[must_use]
pub fn invoice_schema() -> RecordSchema {
    let rules = [
        FieldRule::required("invoice_number", FieldType::String).with_pattern(r"^INV-\d+$"),
        FieldRule::required("vendor", FieldType::String),
        FieldRule::required("total", FieldType::Number),
        FieldRule::optional("line_items", FieldType::Array),
    ];
    RecordSchema::new(rules).unwrap_or_default()
}

/// Guards with millisecond delays, for tests and benches.
#[must_use]
pub fn fast_resilience(max_attempts: u32, failure_threshold: u32) -> ResilienceConfig {
    ResilienceConfig::new()
        .with_timeout_seconds(1.0)
        .with_max_retries(max_attempts)
        .with_initial_delay(0.01)
        .with_max_delay(0.1)
        .with_circuit_failure_threshold(failure_threshold)
        .with_circuit_recovery_timeout(30.0)
}

/// An [`IngestConfig`] using [`fast_resilience`] for both dependencies.
#[must_use]
pub fn fast_config(max_attempts: u32, failure_threshold: u32) -> IngestConfig {
    IngestConfig::default()
        .with_ai_service(fast_resilience(max_attempts, failure_threshold))
        .with_storage(fast_resilience(max_attempts, failure_threshold))
}
