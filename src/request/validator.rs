//! Schema-aware request validation.
//!
//! Reconciliation stops at the first problem; the validator walks the whole
//! request and reports every error it finds, plus warnings for things that
//! are legal but probably unintended.

use serde_json::{Map, Value};
use tracing::debug;

use crate::adapter::{AdapterRegistry, FieldDescriptor, FieldType};
use crate::error::{ConfigError, Result};
use crate::normalize::{LOCATION_FIELD, Normalizer, to_camel_case};

use super::spec::{Intent, Request};

/// Validation result containing every problem found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Problems that would make reconciliation fail.
    pub errors: Vec<ValidationIssue>,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Path of the offending field.
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

/// Validator for requests against registered schemas.
#[derive(Debug)]
pub struct RequestValidator<'a> {
    /// Known kinds.
    registry: &'a AdapterRegistry,
}

impl<'a> RequestValidator<'a> {
    /// Creates a validator.
    #[must_use]
    pub const fn new(registry: &'a AdapterRegistry) -> Self {
        Self { registry }
    }

    /// Validates a request, failing on the first error.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first offending field.
    pub fn validate(&self, request: &Request) -> Result<ValidationResult> {
        let result = self.check(request);
        match result.errors.first() {
            None => {
                debug!("Request validation passed");
                Ok(result)
            }
            Some(first) => Err(ConfigError::validation(first.message.clone(), first.field.clone()).into()),
        }
    }

    /// Collects every error and warning for a request.
    #[must_use]
    pub fn check(&self, request: &Request) -> ValidationResult {
        let mut result = ValidationResult::default();

        let Some(adapter) = self.registry.get(&request.kind) else {
            result.error(
                "kind",
                format!(
                    "unknown kind '{}'; known kinds: {}",
                    request.kind,
                    self.registry.kinds().join(", ")
                ),
            );
            return result;
        };
        let schema = adapter.schema();

        if let Err(message) = schema.check_identity(&request.identity) {
            result.error("identity", message);
        }

        if request.intent == Intent::Absent {
            if !request.desired.is_empty() {
                result
                    .warnings
                    .push("desired state is ignored when intent is absent".to_string());
            }
            return result;
        }

        Self::check_fields(&request.desired, &schema.fields, "", &mut result);

        if !request.desired.contains_key(LOCATION_FIELD) && schema.requires_location() {
            if request.defaults.location.is_some() {
                result
                    .warnings
                    .push("location not set; the default location will be used".to_string());
            } else {
                result.error("/location", "missing required field '/location'");
            }
        }

        if result.is_valid() {
            if let Err(e) = Normalizer::for_request(schema, request).canonicalize_desired(&request.desired) {
                let field = e
                    .details()
                    .and_then(|d| d.get("field").and_then(Value::as_str).map(ToString::to_string))
                    .unwrap_or_default();
                result.error(field, e.to_string());
            }
        }

        if request.dry_run && request.force_update {
            result
                .warnings
                .push("force_update has no effect in a dry run beyond the predicted action".to_string());
        }

        result
    }

    fn check_fields(input: &Map<String, Value>, fields: &[FieldDescriptor], path: &str, result: &mut ValidationResult) {
        for (key, value) in input {
            let field_path = format!("{path}/{key}");
            let Some(descriptor) = fields.iter().find(|f| f.name == *key || f.wire() == *key) else {
                result.warnings.push(format!(
                    "unknown field '{field_path}' is passed through as '{}'",
                    to_camel_case(key)
                ));
                continue;
            };
            if value.is_null() {
                continue;
            }
            if descriptor.resource_id.is_none() && !descriptor.field_type.accepts(value) {
                result.error(
                    field_path,
                    format!("expected {}, got {value}", descriptor.field_type.label()),
                );
                continue;
            }

            match (&descriptor.field_type, value) {
                (FieldType::Object(children), Value::Object(map)) => {
                    Self::check_required(map, children, &field_path, result);
                    Self::check_fields(map, children, &field_path, result);
                }
                (FieldType::List(inner), Value::Array(items)) => {
                    if let FieldType::Object(children) = inner.as_ref() {
                        for (i, item) in items.iter().enumerate() {
                            let item_path = format!("{field_path}/{i}");
                            match item {
                                Value::Object(map) => {
                                    Self::check_required(map, children, &item_path, result);
                                    Self::check_fields(map, children, &item_path, result);
                                }
                                other => result.error(item_path, format!("expected object, got {other}")),
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn check_required(input: &Map<String, Value>, fields: &[FieldDescriptor], path: &str, result: &mut ValidationResult) {
        for descriptor in fields.iter().filter(|f| f.required) {
            let present = input
                .iter()
                .any(|(k, v)| (*k == descriptor.name || *k == descriptor.wire()) && !v.is_null());
            if !present {
                let field = format!("{path}/{}", descriptor.name);
                result.error(field.clone(), format!("missing required field '{field}'"));
            }
        }
    }
}
