//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::{Value, json};
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::adapter::{AdapterRegistry, FieldDescriptor, FieldType, ResourceSchema};
use crate::planner::{Action, Plan};
use crate::request::{Request, ValidationResult};
use crate::verdict::{DivergenceReport, Verdict};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Registered kind row for table display.
#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Fields")]
    fields: usize,
    #[tabled(rename = "Update")]
    update: String,
}

/// Schema field row for table display.
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    path: String,
    #[tabled(rename = "Type")]
    field_type: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Wire name")]
    wire: String,
    #[tabled(rename = "Notes")]
    notes: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a verdict, with the request fingerprint when known.
    #[must_use]
    pub fn format_verdict(&self, verdict: &Verdict, request_hash: Option<&str>) -> String {
        match self.format {
            OutputFormat::Json => {
                let mut value = serde_json::to_value(verdict).unwrap_or(Value::Null);
                if let (Some(hash), Value::Object(map)) = (request_hash, &mut value) {
                    map.insert("request_hash".to_string(), json!(hash));
                }
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_verdict_text(verdict, request_hash),
        }
    }

    fn format_verdict_text(verdict: &Verdict, request_hash: Option<&str>) -> String {
        let mut output = String::new();

        let status = if verdict.is_success() {
            "✓".green()
        } else if verdict.is_canceled() {
            "⚠".yellow()
        } else {
            "✗".red()
        };
        let _ = writeln!(output, "\n{status} {}", verdict.identity);
        if let Some(hash) = request_hash {
            let _ = writeln!(output, "   Request hash: {}", short(hash));
        }

        let changed = if verdict.changed {
            "yes".yellow().to_string()
        } else {
            "no".dimmed().to_string()
        };
        let _ = writeln!(output, "   Action: {}", Self::format_action(verdict.action));
        let _ = writeln!(output, "   Changed: {changed}");

        if let Some(divergence) = &verdict.divergence {
            let _ = write!(output, "{}", Self::format_divergence(divergence));
        }

        if let Some(error) = &verdict.error {
            let _ = writeln!(output, "\n{} {}: {}", "Error".red(), error.kind, error.message);
            if let Some(details) = &error.details {
                let _ = writeln!(output, "   Details: {details}");
            }
        }

        if let Some(projection) = &verdict.projection {
            let _ = writeln!(output, "\nResult:");
            let pretty = serde_json::to_string_pretty(projection).unwrap_or_default();
            for line in pretty.lines() {
                let _ = writeln!(output, "   {line}");
            }
        }

        output
    }

    fn format_divergence(divergence: &DivergenceReport) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "   Divergence at {}:", divergence.path.bold());
        let _ = writeln!(output, "     {} {}", "-".red(), divergence.old);
        let _ = writeln!(output, "     {} {}", "+".green(), divergence.new);
        output
    }

    /// Formats an offline plan.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, identity: &str) -> String {
        let divergence = plan.divergence.as_ref().map(DivergenceReport::from);
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "identity": identity,
                "action": plan.action,
                "divergence": divergence,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                if plan.is_noop() {
                    return format!("{} {identity} is converged.\n", "✓".green());
                }
                let mut output = format!("{} {identity}\n", Self::format_action(plan.action));
                if let Some(divergence) = &divergence {
                    output.push_str(&Self::format_divergence(divergence));
                }
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, request: &Request, request_hash: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "valid": result.is_valid(),
                "kind": request.kind,
                "identity": request.identity.to_string(),
                "intent": request.intent,
                "request_hash": request_hash,
                "errors": result
                    .errors
                    .iter()
                    .map(|e| json!({"field": e.field, "message": e.message}))
                    .collect::<Vec<_>>(),
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Request is valid.", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Request is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {}: {}", error.field, error.message);
                    }
                }
                if !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = writeln!(output, "\nRequest summary:");
                let _ = writeln!(output, "   Kind: {}", request.kind);
                let _ = writeln!(output, "   Identity: {}", request.identity);
                let _ = writeln!(output, "   Intent: {}", request.intent);
                let _ = writeln!(output, "   Fields: {}", request.desired.len());
                let _ = writeln!(output, "   Request hash: {}", short(request_hash));
                output
            }
        }
    }

    /// Formats the registered kinds.
    #[must_use]
    pub fn format_kinds(&self, registry: &AdapterRegistry) -> String {
        let adapters: Vec<_> = registry.kinds().into_iter().filter_map(|k| registry.get(k)).collect();
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(
                &adapters
                    .iter()
                    .map(|a| {
                        json!({
                            "kind": a.schema().kind,
                            "identity": a.schema().identity,
                            "supports_update": a.supports_update(),
                        })
                    })
                    .collect::<Vec<_>>(),
            )
            .unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<KindRow> = adapters
                    .iter()
                    .map(|a| KindRow {
                        kind: a.schema().kind.clone(),
                        identity: a.schema().identity.join("/"),
                        fields: a.schema().fields.len(),
                        update: if a.supports_update() { "in place" } else { "recreate" }.to_string(),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats the argument schema of a kind.
    #[must_use]
    pub fn format_schema(&self, schema: &ResourceSchema) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(schema).unwrap_or_default(),
            OutputFormat::Text => {
                let mut rows = Vec::new();
                collect_rows(&schema.fields, "", &mut rows);

                let mut output = String::new();
                let _ = writeln!(output, "\n{} ({})\n", schema.kind.bold(), schema.identity.join("/"));
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats an action with color.
    fn format_action(action: Action) -> String {
        match action {
            Action::Create => "+create".green().to_string(),
            Action::Update => "~update".yellow().to_string(),
            Action::Recreate => "±recreate".yellow().to_string(),
            Action::Delete => "-delete".red().to_string(),
            Action::None => "none".dimmed().to_string(),
        }
    }
}

fn collect_rows(fields: &[FieldDescriptor], prefix: &str, rows: &mut Vec<FieldRow>) {
    for field in fields {
        let path = format!("{prefix}/{}", field.name);
        let mut notes = Vec::new();
        if let Some(case) = field.enum_case {
            notes.push(format!("{case:?} case").to_lowercase());
        }
        if let Some(resource_type) = &field.resource_id {
            notes.push(format!("references {resource_type}"));
        }

        rows.push(FieldRow {
            path: path.clone(),
            field_type: field.field_type.label(),
            required: if field.required { "yes" } else { "" }.to_string(),
            wire: field.wire(),
            notes: notes.join(", "),
        });

        match &field.field_type {
            FieldType::Object(children) => collect_rows(children, &path, rows),
            FieldType::List(inner) => {
                if let FieldType::Object(children) = inner.as_ref() {
                    collect_rows(children, &format!("{path}/*"), rows);
                }
            }
            _ => {}
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
