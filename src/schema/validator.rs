//! Structural contract checks for documents and sections.

use std::collections::HashMap;
use std::fmt;

use jsonschema::{Draft, JSONSchema};
use serde::Serialize;
use serde_json::Value;

use crate::document::SectionName;
use crate::error::{Error, Result};

const DOCUMENT_SCHEMA: &str = include_str!("schemas/document.schema.json");

fn section_schema_source(name: SectionName) -> &'static str {
    match name {
        SectionName::Functional => include_str!("schemas/functional.schema.json"),
        SectionName::Technical => include_str!("schemas/technical.schema.json"),
        SectionName::Architecture => include_str!("schemas/architecture.schema.json"),
        SectionName::Testing => include_str!("schemas/testing.schema.json"),
        SectionName::Implementation => include_str!("schemas/implementation.schema.json"),
        SectionName::Review => include_str!("schemas/review.schema.json"),
        SectionName::Documentation => include_str!("schemas/documentation.schema.json"),
        SectionName::Deployment => include_str!("schemas/deployment.schema.json"),
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Whether every constraint held
    pub valid: bool,

    /// Every violated constraint, formatted as `<path>: <message>`
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// A passing report.
    pub fn ok() -> Self {
        Self { valid: true, errors: Vec::new() }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}

/// Schema validator for the requirement document and its sections.
///
/// Schemas are embedded at compile time. Validation never mutates its
/// input and reports every violation in a single pass.
pub struct SchemaValidator {
    document: JSONSchema,
    sections: HashMap<SectionName, JSONSchema>,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compile the embedded schemas.
    pub fn new() -> Result<Self> {
        let document = compile("document", DOCUMENT_SCHEMA)?;

        let mut sections = HashMap::new();
        for name in SectionName::ALL {
            sections.insert(name, compile(name.as_str(), section_schema_source(name))?);
        }

        Ok(Self { document, sections })
    }

    /// Check a whole document against the top-level schema.
    pub fn validate_document(&self, doc: &Value) -> ValidationReport {
        ValidationReport::from_errors(collect_errors(&self.document, doc))
    }

    /// Check one section's `data` against the schema registered for `name`.
    ///
    /// Names without a registered schema are trivially valid.
    pub fn validate_section(&self, name: &str, data: &Value) -> ValidationReport {
        match name.parse::<SectionName>() {
            Ok(section) => self.validate_section_data(section, data),
            Err(_) => {
                tracing::debug!(section = name, "No schema registered, accepting section");
                ValidationReport::ok()
            }
        }
    }

    /// Typed variant of [`validate_section`](Self::validate_section).
    pub fn validate_section_data(&self, name: SectionName, data: &Value) -> ValidationReport {
        self.sections
            .get(&name)
            .map(|schema| ValidationReport::from_errors(collect_errors(schema, data)))
            .unwrap_or_else(ValidationReport::ok)
    }
}

fn compile(label: &str, source: &str) -> Result<JSONSchema> {
    let value: Value = serde_json::from_str(source)?;
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&value)
        .map_err(|e| Error::Schema { name: label.to_string(), reason: e.to_string() })
}

fn collect_errors(schema: &JSONSchema, instance: &Value) -> Vec<String> {
    match schema.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "root".to_string() } else { path };
                format!("{path}: {e}")
            })
            .collect(),
    }
}
