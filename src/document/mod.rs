//! Requirement document (RVD) model and persistence.
//!
//! ## Layout
//!
//! - `version`, `created`, `lastUpdated` - provenance
//! - `project` - name and path
//! - one key per fixed section (`functional` ... `deployment`), `null` until produced
//! - `executionLog` - append-only audit trail
//! - `kpis` - accumulated counters

mod model;
mod store;

pub use model::{
    Document, DocumentSummary, Kpis, LogEntry, LogStatus, ProjectMeta, RunStatus, Section,
    SectionName, DOCUMENT_VERSION,
};
pub use store::{DocumentStore, DOCUMENT_EXTENSION};
