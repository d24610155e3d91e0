//! Shape checks for the structured fields returned by the AI service.

use crate::core::StructuredFields;
use crate::errors::{ConfigError, FieldViolation, ValidationError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A JSON string.
    String,
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// Any non-null value.
    #[default]
    Any,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A rule for one top-level field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Field name.
    pub name: String,
    /// Expected JSON type.
    #[serde(default)]
    pub field_type: FieldType,
    /// Whether the field must be present and non-null.
    #[serde(default)]
    pub required: bool,
    /// Regex a string value must match.
    #[serde(default)]
    pub pattern: Option<String>,
}

impl FieldRule {
    /// A field that must be present.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            pattern: None,
        }
    }

    /// A field checked only when present.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            pattern: None,
        }
    }

    /// Requires string values to match `pattern`.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: FieldRule,
    pattern: Option<Regex>,
}

/// The expected shape of a structured record.
///
/// Patterns are compiled once when the schema is built. The default schema
/// has no rules and accepts any record.
#[derive(Debug, Clone, Default)]
pub struct RecordSchema {
    rules: Vec<CompiledRule>,
}

impl RecordSchema {
    /// Builds a schema, compiling every pattern.
    pub fn new(rules: impl IntoIterator<Item = FieldRule>) -> Result<Self, ConfigError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = rule
                    .pattern
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .map_err(|source| ConfigError::Pattern {
                        field: rule.name.clone(),
                        source,
                    })?;
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { rules })
    }

    /// Returns the rules in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &FieldRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Returns true if the schema has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks `fields`, reporting every violated rule at once.
    pub fn validate(&self, fields: &StructuredFields) -> Result<(), ValidationError> {
        let violations: Vec<FieldViolation> = self
            .rules
            .iter()
            .filter_map(|compiled| check(compiled, fields.get(&compiled.rule.name)))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(violations))
        }
    }
}

fn check(compiled: &CompiledRule, value: Option<&Value>) -> Option<FieldViolation> {
    let rule = &compiled.rule;
    let violation = |reason: String| {
        Some(FieldViolation {
            field: rule.name.clone(),
            reason,
        })
    };

    let value = match value {
        None | Some(Value::Null) if rule.required => {
            return violation("missing required field".to_string())
        }
        None | Some(Value::Null) => return None,
        Some(value) => value,
    };

    if !rule.field_type.matches(value) {
        return violation(format!(
            "expected {}, found {}",
            rule.field_type,
            json_type_name(value)
        ));
    }

    if let (Some(pattern), Value::String(text)) = (&compiled.pattern, value) {
        if !pattern.is_match(text) {
            return violation(format!("does not match pattern '{}'", pattern.as_str()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> StructuredFields {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fields must be an object"),
        }
    }

    fn invoice_schema() -> RecordSchema {
        RecordSchema::new([
            FieldRule::required("invoice_number", FieldType::String).with_pattern(r"^INV-\d+$"),
            FieldRule::required("total", FieldType::Number),
            FieldRule::optional("line_items", FieldType::Array),
        ])
        .unwrap()
    }

    #[test]
    fn test_default_schema_accepts_anything() {
        let schema = RecordSchema::default();
        assert!(schema.is_empty());
        assert!(schema.validate(&fields(json!({"x": 1}))).is_ok());
    }

    #[test]
    fn test_valid_record() {
        let record = fields(json!({
            "invoice_number": "INV-1001",
            "total": 99.5,
            "line_items": [],
        }));
        assert!(invoice_schema().validate(&record).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let record = fields(json!({"total": 10}));
        let err = invoice_schema().validate(&record).unwrap_err();
        assert_eq!(err.fields(), vec!["invoice_number"]);
        assert_eq!(err.violations[0].reason, "missing required field");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let record = fields(json!({"invoice_number": null, "total": 10}));
        assert!(invoice_schema().validate(&record).is_err());
    }

    #[test]
    fn test_reports_all_violations() {
        let record = fields(json!({
            "invoice_number": "1001",
            "total": "ten",
            "line_items": {},
        }));
        let err = invoice_schema().validate(&record).unwrap_err();
        assert_eq!(err.fields(), vec!["invoice_number", "total", "line_items"]);
        assert_eq!(err.violations[1].reason, "expected number, found string");
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let result = RecordSchema::new([FieldRule::required("x", FieldType::String).with_pattern("(")]);
        assert!(matches!(result, Err(ConfigError::Pattern { ref field, .. }) if field == "x"));
    }

    #[test]
    fn test_rules_deserialize() {
        let rule: FieldRule = serde_json::from_value(json!({
            "name": "vendor",
            "field_type": "string",
            "required": true,
        }))
        .unwrap();
        assert_eq!(rule, FieldRule::required("vendor", FieldType::String));
    }
}
