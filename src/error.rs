//! Error types for the pipeline core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the document store, validator, rule engine and orchestrator.
///
/// `MissingInput` and `ContractViolation` carry everything a caller needs to
/// locate the root cause and are never defaulted away inside the core.
#[derive(Debug, Error)]
pub enum Error {
    /// No persisted document for this id.
    #[error("Document '{id}' not found at {}", path.display())]
    NotFound { id: String, path: PathBuf },

    /// Document id contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid document id '{0}': use 1-128 characters from [A-Za-z0-9_-]")]
    InvalidDocumentId(String),

    /// Persisted document exists but cannot be read back.
    #[error("Document corrupted at {}: {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    /// A phase input is absent, empty or structurally invalid.
    #[error(
        "Phase '{phase}' is missing input '{section}.data.{field}' \
         (expected from phase '{section}'): {reason}"
    )]
    MissingInput { phase: String, section: String, field: String, reason: String },

    /// A phase produced output that failed its section schema.
    #[error(
        "Phase '{phase}' output from {produced_by} violates the '{section}' contract:\n  - {}",
        violations.join("\n  - ")
    )]
    ContractViolation {
        phase: String,
        produced_by: String,
        section: String,
        violations: Vec<String>,
    },

    /// An embedded schema failed to compile.
    #[error("Invalid schema '{name}': {reason}")]
    Schema { name: String, reason: String },

    /// The rule set could not be loaded.
    #[error("Failed to load rule set from {source_name}: {reason}")]
    RuleEngineLoad { source_name: String, reason: String },

    /// A rule's `abort-with-error` action fired.
    #[error("Rule '{rule_id}' aborted phase '{phase}': {message}")]
    Abort { rule_id: String, phase: String, message: String },

    /// The external producer for a phase returned an error.
    #[error("Producer for phase '{phase}' failed: {source}")]
    ProducerFailed {
        phase: String,
        #[source]
        source: anyhow::Error,
    },

    /// The phase descriptor list breaks ordering or dependency rules.
    #[error("Invalid phase order: {0}")]
    PhaseOrder(String),

    /// IO error.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build an IO error bound to the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_names_field_and_producer() {
        let err = Error::MissingInput {
            phase: "architecture".to_string(),
            section: "functional".to_string(),
            field: "requirements".to_string(),
            reason: "sequence is empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("requirements"));
        assert!(msg.contains("expected from phase 'functional'"));
    }

    #[test]
    fn test_contract_violation_lists_every_field() {
        let err = Error::ContractViolation {
            phase: "functional".to_string(),
            produced_by: "builtin/functional".to_string(),
            section: "functional".to_string(),
            violations: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Phase 'functional' output from builtin/functional"));
        assert!(msg.contains("  - a"));
        assert!(msg.contains("  - b"));
    }
}
