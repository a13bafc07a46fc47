//! File-backed document store.
//!
//! One JSON file per document under the store root. Writes go to a
//! temporary file in the same directory, are fsynced, then renamed over
//! the target so a concurrent `load` never observes a torn document.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::model::{Document, DocumentSummary, LogEntry, LogStatus, ProjectMeta, Section, SectionName};
use crate::error::{Error, Result};
use crate::schema::SchemaValidator;

/// File extension for persisted documents.
pub const DOCUMENT_EXTENSION: &str = "rvd.json";

/// Persists and mutates requirement documents.
#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    validator: SchemaValidator,
}

impl DocumentStore {
    /// Open a store rooted at `root`. The directory is created on first save.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self { root: root.into(), validator: SchemaValidator::new()? })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validator used for every section write.
    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    /// Path of the persisted file for `id`.
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(format!("{id}.{DOCUMENT_EXTENSION}")))
    }

    /// Whether a document has been persisted under `id`.
    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.path_for(id)?.is_file())
    }

    /// Load a persisted document.
    pub fn load(&self, id: &str) -> Result<Document> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(Error::NotFound { id: id.to_string(), path });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let mut doc: Document = serde_json::from_str(&content)
            .map_err(|e| Error::Corrupted { path: path.clone(), reason: e.to_string() })?;
        doc.id = id.to_string();

        tracing::debug!(id, entries = doc.execution_log.len(), "Loaded document");
        Ok(doc)
    }

    /// Load `id`, or build a fresh document with every section empty.
    ///
    /// A fresh document is not persisted until [`save`](Self::save).
    pub fn load_or_create(&self, id: &str, project: ProjectMeta) -> Result<Document> {
        if self.exists(id)? {
            return self.load(id);
        }

        let mut doc = Document::new(id, project);
        let report = self.validator.validate_document(&doc.to_value()?);
        if !report.valid {
            return Err(Error::ContractViolation {
                phase: "create".to_string(),
                produced_by: "store".to_string(),
                section: "document".to_string(),
                violations: report.errors,
            });
        }

        let detail = format!("document created for project '{}'", doc.project.name);
        self.record_event(&mut doc, "document", LogStatus::Created, detail, None);
        tracing::info!(id, project = %doc.project.name, "Created document");
        Ok(doc)
    }

    /// Atomically overwrite the persisted representation.
    pub fn save(&self, doc: &Document) -> Result<()> {
        let target = self.path_for(&doc.id)?;
        std::fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;

        let json = serde_json::to_string_pretty(doc)?;

        let mut temp =
            tempfile::NamedTempFile::new_in(&self.root).map_err(|e| Error::io(&self.root, e))?;
        temp.write_all(json.as_bytes()).map_err(|e| Error::io(temp.path(), e))?;
        temp.as_file().sync_all().map_err(|e| Error::io(temp.path(), e))?;
        temp.persist(&target).map_err(|e| Error::io(&target, e.error))?;

        tracing::debug!(id = doc.id, path = ?target, "Saved document");
        Ok(())
    }

    /// SHA-256 of the persisted bytes, hex encoded.
    pub fn fingerprint(&self, id: &str) -> Result<String> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(Error::NotFound { id: id.to_string(), path });
        }
        let bytes = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Get a section, if produced.
    pub fn get_section(doc: &Document, name: SectionName) -> Option<&Section> {
        doc.section(name)
    }

    /// Replace a section wholesale and append a `completed` log entry.
    ///
    /// `data` is validated first; on violation the document is untouched.
    pub fn set_section(
        &self,
        doc: &mut Document,
        name: SectionName,
        data: Value,
        produced_by: &str,
    ) -> Result<()> {
        self.set_section_for_run(doc, name, data, produced_by, None, None)
    }

    /// [`set_section`](Self::set_section) with run correlation and a custom log detail.
    pub fn set_section_for_run(
        &self,
        doc: &mut Document,
        name: SectionName,
        data: Value,
        produced_by: &str,
        run_id: Option<Uuid>,
        detail: Option<String>,
    ) -> Result<()> {
        let report = self.validator.validate_section_data(name, &data);
        if !report.valid {
            return Err(Error::ContractViolation {
                phase: name.to_string(),
                produced_by: produced_by.to_string(),
                section: name.to_string(),
                violations: report.errors,
            });
        }

        let timestamp = Utc::now();
        doc.replace_section(
            name,
            Section { timestamp, produced_by: produced_by.to_string(), data },
        );
        doc.append_log(LogEntry {
            phase: name.to_string(),
            status: LogStatus::Completed,
            timestamp,
            detail: detail.unwrap_or_else(|| format!("produced by {produced_by}")),
            run_id,
        });
        Ok(())
    }

    /// Append a lifecycle event that does not touch any section.
    pub fn record_event(
        &self,
        doc: &mut Document,
        phase: &str,
        status: LogStatus,
        detail: impl Into<String>,
        run_id: Option<Uuid>,
    ) {
        doc.append_log(LogEntry {
            phase: phase.to_string(),
            status,
            timestamp: Utc::now(),
            detail: detail.into(),
            run_id,
        });
    }

    /// Derived progress view.
    pub fn summary(doc: &Document) -> DocumentSummary {
        doc.summary()
    }
}

/// Document ids are file stems: 1-128 chars from `[A-Za-z0-9_-]`.
fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidDocumentId(id.to_string()))
    }
}
