//! Phase descriptors and hand-off contracts.
//!
//! The phase order is an explicit list. Each descriptor names the section it
//! produces and the fields of earlier sections it consumes, so ordering and
//! dependencies can be checked statically with [`validate_phase_order`].

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::document::{Document, ProjectMeta, SectionName};
use crate::error::{Error, Result};
use crate::schema::SchemaValidator;

/// A field of an earlier section that a phase consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequirement {
    pub section: SectionName,
    pub field: String,
}

impl InputRequirement {
    pub fn new(section: SectionName, field: impl Into<String>) -> Self {
        Self { section, field: field.into() }
    }
}

/// One step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDescriptor {
    /// Section this phase writes
    pub output: SectionName,

    /// Inputs, checked in declaration order
    pub inputs: Vec<InputRequirement>,

    /// Rule-engine phase consulted after producing, if any
    pub rule_phase: Option<String>,
}

impl PhaseDescriptor {
    pub fn new(output: SectionName) -> Self {
        Self { output, inputs: Vec::new(), rule_phase: None }
    }

    #[must_use]
    pub fn input(mut self, section: SectionName, field: &str) -> Self {
        self.inputs.push(InputRequirement::new(section, field));
        self
    }

    #[must_use]
    pub fn rules(mut self, phase: &str) -> Self {
        self.rule_phase = Some(phase.to_string());
        self
    }

    /// Phase name (same as its output section).
    pub fn name(&self) -> &'static str {
        self.output.as_str()
    }

    /// Sections this phase reads, deduplicated, in declaration order.
    pub fn input_sections(&self) -> Vec<SectionName> {
        let mut seen = HashSet::new();
        self.inputs.iter().map(|i| i.section).filter(|s| seen.insert(*s)).collect()
    }
}

/// The fixed eight-phase order.
pub fn default_phases() -> Vec<PhaseDescriptor> {
    use SectionName::*;

    vec![
        PhaseDescriptor::new(Functional),
        PhaseDescriptor::new(Technical).input(Functional, "requirements"),
        PhaseDescriptor::new(Architecture)
            .input(Functional, "requirements")
            .input(Technical, "specifications"),
        PhaseDescriptor::new(Testing)
            .input(Functional, "requirements")
            .input(Architecture, "components"),
        PhaseDescriptor::new(Implementation)
            .input(Architecture, "components")
            .input(Testing, "testCases")
            .rules("implementation"),
        PhaseDescriptor::new(Review).input(Implementation, "files").rules("review"),
        PhaseDescriptor::new(Documentation)
            .input(Functional, "requirements")
            .input(Architecture, "components")
            .input(Implementation, "files")
            .rules("documentation"),
        PhaseDescriptor::new(Deployment)
            .input(Implementation, "files")
            .input(Review, "approved")
            .rules("deployment"),
    ]
}

/// Reject descriptor lists where a phase reads a section no earlier phase
/// produces, or where two phases produce the same section.
pub fn validate_phase_order(phases: &[PhaseDescriptor]) -> Result<()> {
    let mut produced = HashSet::new();

    for phase in phases {
        for input in &phase.inputs {
            if !produced.contains(&input.section) {
                return Err(Error::PhaseOrder(format!(
                    "phase '{}' reads '{}.{}' but no earlier phase produces '{}'",
                    phase.name(),
                    input.section,
                    input.field,
                    input.section
                )));
            }
        }
        if !produced.insert(phase.output) {
            return Err(Error::PhaseOrder(format!(
                "section '{}' is produced by more than one phase",
                phase.output
            )));
        }
    }

    Ok(())
}

/// Everything a producer may read.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseInput {
    pub document_id: String,
    pub project: ProjectMeta,

    /// Raw requirement text, when the run was started from one
    pub requirement: Option<String>,

    /// `data` of each declared input section
    pub sections: BTreeMap<SectionName, Value>,
}

impl PhaseInput {
    /// Data of an input section.
    pub fn section(&self, name: SectionName) -> Option<&Value> {
        self.sections.get(&name)
    }

    /// Array field of an input section, or an empty slice.
    pub fn items(&self, name: SectionName, field: &str) -> &[Value] {
        self.section(name)
            .and_then(|data| data.get(field))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Produces one section's data from its inputs.
#[async_trait]
pub trait PhaseProducer: Send + Sync {
    /// Recorded as the section's `producedBy`.
    fn name(&self) -> &str;

    async fn produce(&self, input: &PhaseInput) -> anyhow::Result<Value>;
}

/// Resolve a phase's inputs from `doc`.
///
/// Fails on the first input that is absent, empty or whose section no
/// longer satisfies its schema, naming the field and the phase that
/// should have produced it.
pub fn resolve_inputs(
    phase: &PhaseDescriptor,
    doc: &Document,
    validator: &SchemaValidator,
) -> Result<BTreeMap<SectionName, Value>> {
    let mut resolved = BTreeMap::new();

    for input in &phase.inputs {
        let missing = |reason: String| Error::MissingInput {
            phase: phase.name().to_string(),
            section: input.section.to_string(),
            field: input.field.clone(),
            reason,
        };

        let section = doc
            .section(input.section)
            .ok_or_else(|| missing("section has not been produced".to_string()))?;

        match section.data.get(&input.field) {
            None => return Err(missing("field is absent".to_string())),
            Some(value) if is_empty(value) => return Err(missing("field is empty".to_string())),
            Some(_) => {}
        }

        if !resolved.contains_key(&input.section) {
            let report = validator.validate_section_data(input.section, &section.data);
            if !report.valid {
                return Err(missing(format!(
                    "section is structurally invalid ({})",
                    report.errors.join("; ")
                )));
            }
            resolved.insert(input.section, section.data.clone());
        }
    }

    Ok(resolved)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::document::Section;

    fn section(data: Value) -> Section {
        Section { timestamp: Utc::now(), produced_by: "test".to_string(), data }
    }

    #[test]
    fn test_default_order_is_valid() {
        let phases = default_phases();
        assert_eq!(phases.len(), SectionName::ALL.len());
        validate_phase_order(&phases).unwrap();

        let outputs: Vec<_> = phases.iter().map(|p| p.output).collect();
        assert_eq!(outputs, SectionName::ALL.to_vec());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let phases = vec![
            PhaseDescriptor::new(SectionName::Functional).input(SectionName::Technical, "specifications"),
            PhaseDescriptor::new(SectionName::Technical),
        ];
        let err = validate_phase_order(&phases).unwrap_err();
        assert!(err.to_string().contains("no earlier phase produces 'technical'"));
    }

    #[test]
    fn test_self_reference_and_duplicates_rejected() {
        let own = vec![PhaseDescriptor::new(SectionName::Review).input(SectionName::Review, "findings")];
        assert!(validate_phase_order(&own).is_err());

        let dup = vec![
            PhaseDescriptor::new(SectionName::Functional),
            PhaseDescriptor::new(SectionName::Functional),
        ];
        assert!(matches!(validate_phase_order(&dup), Err(Error::PhaseOrder(_))));
    }

    #[test]
    fn test_missing_input_names_field_and_producer() {
        let validator = SchemaValidator::new().unwrap();
        let phases = default_phases();
        let architecture = &phases[2];

        let mut doc = Document::new("doc", ProjectMeta::new("hello-world"));
        let err = resolve_inputs(architecture, &doc, &validator).unwrap_err();
        assert!(err.to_string().contains("functional.data.requirements"));

        doc.replace_section(SectionName::Functional, section(json!({ "requirements": [] })));
        match resolve_inputs(architecture, &doc, &validator).unwrap_err() {
            Error::MissingInput { phase, section, field, .. } => {
                assert_eq!(phase, "architecture");
                assert_eq!(section, "functional");
                assert_eq!(field, "requirements");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_structurally_invalid_input() {
        let validator = SchemaValidator::new().unwrap();
        let technical = &default_phases()[1];

        let mut doc = Document::new("doc", ProjectMeta::new("p"));
        doc.replace_section(SectionName::Functional, section(json!({ "requirements": [{ "type": "x" }] })));
        let err = resolve_inputs(technical, &doc, &validator).unwrap_err();
        assert!(err.to_string().contains("structurally invalid"));
    }

    #[test]
    fn test_resolved_inputs() {
        let validator = SchemaValidator::new().unwrap();
        let technical = &default_phases()[1];

        let mut doc = Document::new("doc", ProjectMeta::new("p"));
        let data = json!({ "requirements": [{ "text": "Users can sign in" }] });
        doc.replace_section(SectionName::Functional, section(data.clone()));

        let resolved = resolve_inputs(technical, &doc, &validator).unwrap();
        assert_eq!(resolved.get(&SectionName::Functional), Some(&data));
    }

    #[test]
    fn test_false_is_not_empty() {
        assert!(!is_empty(&json!(false)));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!("  ")));
    }
}
