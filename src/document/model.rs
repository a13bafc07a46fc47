//! Requirement document structures.
//!
//! Defines the canonical state object (RVD) that flows through the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Version stamped on newly created documents.
pub const DOCUMENT_VERSION: &str = "1.0.0";

/// Fixed section names, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionName {
    Functional,
    Technical,
    Architecture,
    Testing,
    Implementation,
    Review,
    Documentation,
    Deployment,
}

impl SectionName {
    /// All sections, in the order their phases run.
    pub const ALL: [Self; 8] = [
        Self::Functional,
        Self::Technical,
        Self::Architecture,
        Self::Testing,
        Self::Implementation,
        Self::Review,
        Self::Documentation,
        Self::Deployment,
    ];

    /// Name as it appears in the persisted document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Functional => "functional",
            Self::Technical => "technical",
            Self::Architecture => "architecture",
            Self::Testing => "testing",
            Self::Implementation => "implementation",
            Self::Review => "review",
            Self::Documentation => "documentation",
            Self::Deployment => "deployment",
        }
    }

    /// Zero-based position in the fixed phase order.
    pub fn position(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or_default()
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|n| n.as_str()).collect();
                format!("unknown section '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Project metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// Project name (required, non-empty)
    pub name: String,

    /// Project path
    #[serde(default)]
    pub path: Option<String>,
}

impl ProjectMeta {
    /// Create project metadata with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), path: None }
    }

    /// Set the project path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Output of exactly one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// When the section was produced
    pub timestamp: DateTime<Utc>,

    /// Producing phase or agent
    pub produced_by: String,

    /// Phase-specific payload
    pub data: Value,
}

/// Slots for every fixed section. Each is `null` until its phase completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sections {
    #[serde(default)]
    functional: Option<Section>,
    #[serde(default)]
    technical: Option<Section>,
    #[serde(default)]
    architecture: Option<Section>,
    #[serde(default)]
    testing: Option<Section>,
    #[serde(default)]
    implementation: Option<Section>,
    #[serde(default)]
    review: Option<Section>,
    #[serde(default)]
    documentation: Option<Section>,
    #[serde(default)]
    deployment: Option<Section>,
}

impl Sections {
    fn get(&self, name: SectionName) -> Option<&Section> {
        self.slot(name).as_ref()
    }

    fn slot(&self, name: SectionName) -> &Option<Section> {
        match name {
            SectionName::Functional => &self.functional,
            SectionName::Technical => &self.technical,
            SectionName::Architecture => &self.architecture,
            SectionName::Testing => &self.testing,
            SectionName::Implementation => &self.implementation,
            SectionName::Review => &self.review,
            SectionName::Documentation => &self.documentation,
            SectionName::Deployment => &self.deployment,
        }
    }

    fn slot_mut(&mut self, name: SectionName) -> &mut Option<Section> {
        match name {
            SectionName::Functional => &mut self.functional,
            SectionName::Technical => &mut self.technical,
            SectionName::Architecture => &mut self.architecture,
            SectionName::Testing => &mut self.testing,
            SectionName::Implementation => &mut self.implementation,
            SectionName::Review => &mut self.review,
            SectionName::Documentation => &mut self.documentation,
            SectionName::Deployment => &mut self.deployment,
        }
    }
}

/// Kind of execution-log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    /// Document was created
    Created,
    /// A phase completed and its section was written
    Completed,
    /// A run was explicitly resumed from a phase
    Resumed,
}

/// One audit-trail entry. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub phase: String,
    pub status: LogStatus,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

/// Aggregate counters. Only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Kpis {
    pub phases_completed: u64,
    pub rules_checked: u64,
    pub rules_applied: u64,
    pub rules_failed: u64,
    pub total_phase_ms: u64,
    pub phase_durations_ms: BTreeMap<String, u64>,
}

impl Kpis {
    pub(crate) fn record_phase(&mut self, phase: SectionName, duration_ms: u64) {
        self.phases_completed += 1;
        self.total_phase_ms += duration_ms;
        *self.phase_durations_ms.entry(phase.as_str().to_string()).or_default() += duration_ms;
    }

    pub(crate) fn record_rules(&mut self, checked: usize, applied: usize, failed: usize) {
        self.rules_checked += checked as u64;
        self.rules_applied += applied as u64;
        self.rules_failed += failed as u64;
    }
}

/// Overall run status. `Failed` only appears in run reports; failures are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Read-only progress view. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub completed_count: usize,
    pub total_phases: usize,
    pub status: RunStatus,
    pub next_phase: Option<SectionName>,
}

/// The single source of truth for one requirement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Store key; derived from the file name, not persisted in the body
    #[serde(skip)]
    pub(crate) id: String,

    pub version: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub project: ProjectMeta,

    #[serde(flatten)]
    pub(crate) sections: Sections,

    #[serde(default)]
    pub(crate) execution_log: Vec<LogEntry>,

    #[serde(default)]
    pub(crate) kpis: Kpis,
}

impl Document {
    /// Create a fresh document with every section empty.
    pub fn new(id: impl Into<String>, project: ProjectMeta) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            version: DOCUMENT_VERSION.to_string(),
            created: now,
            last_updated: now,
            project,
            sections: Sections::default(),
            execution_log: Vec::new(),
            kpis: Kpis::default(),
        }
    }

    /// Store key of this document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get a section, if its phase has completed.
    pub fn section(&self, name: SectionName) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Audit trail, oldest first.
    pub fn execution_log(&self) -> &[LogEntry] {
        &self.execution_log
    }

    /// Accumulated counters.
    pub fn kpis(&self) -> &Kpis {
        &self.kpis
    }

    /// Sections that have been produced, in phase order.
    pub fn completed_sections(&self) -> Vec<SectionName> {
        SectionName::ALL.into_iter().filter(|name| self.section(*name).is_some()).collect()
    }

    /// Derive the progress summary.
    pub fn summary(&self) -> DocumentSummary {
        let completed_count = self.completed_sections().len();
        let total_phases = SectionName::ALL.len();
        let next_phase = SectionName::ALL.into_iter().find(|name| self.section(*name).is_none());

        let status = if completed_count == 0 {
            RunStatus::Pending
        } else if completed_count == total_phases {
            RunStatus::Completed
        } else {
            RunStatus::InProgress
        };

        DocumentSummary { completed_count, total_phases, status, next_phase }
    }

    /// Serialize for validation or display.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub(crate) fn replace_section(&mut self, name: SectionName, section: Section) {
        *self.sections.slot_mut(name) = Some(section);
    }

    pub(crate) fn append_log(&mut self, entry: LogEntry) {
        self.last_updated = entry.timestamp;
        self.execution_log.push(entry);
    }

    pub(crate) fn kpis_mut(&mut self) -> &mut Kpis {
        &mut self.kpis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_has_empty_sections() {
        let doc = Document::new("demo", ProjectMeta::new("hello-world"));
        for name in SectionName::ALL {
            assert!(doc.section(name).is_none());
        }
        assert!(doc.execution_log().is_empty());
        assert_eq!(doc.summary().status, RunStatus::Pending);
        assert_eq!(doc.summary().next_phase, Some(SectionName::Functional));
    }

    #[test]
    fn test_persisted_shape_has_one_key_per_section() {
        let doc = Document::new("demo", ProjectMeta::new("hello-world"));
        let value = doc.to_value().unwrap();
        let obj = value.as_object().unwrap();

        for name in SectionName::ALL {
            assert_eq!(obj.get(name.as_str()), Some(&Value::Null), "{name}");
        }
        assert!(obj.contains_key("lastUpdated"));
        assert!(obj.contains_key("executionLog"));
        assert!(obj.contains_key("kpis"));
        assert!(!obj.contains_key("id"));
    }

    #[test]
    fn test_section_name_parse() {
        assert_eq!("Technical".parse::<SectionName>().unwrap(), SectionName::Technical);
        assert!("frontend".parse::<SectionName>().is_err());
        assert_eq!(SectionName::Review.position(), 5);
    }

    #[test]
    fn test_summary_progress() {
        let mut doc = Document::new("demo", ProjectMeta::new("p"));
        doc.replace_section(
            SectionName::Functional,
            Section {
                timestamp: Utc::now(),
                produced_by: "functional".to_string(),
                data: serde_json::json!({}),
            },
        );
        let summary = doc.summary();
        assert_eq!(summary.completed_count, 1);
        assert_eq!(summary.total_phases, 8);
        assert_eq!(summary.status, RunStatus::InProgress);
        assert_eq!(summary.next_phase, Some(SectionName::Technical));
    }

    #[test]
    fn test_kpis_accumulate() {
        let mut kpis = Kpis::default();
        kpis.record_phase(SectionName::Functional, 10);
        kpis.record_phase(SectionName::Functional, 5);
        kpis.record_rules(3, 2, 1);
        assert_eq!(kpis.phases_completed, 2);
        assert_eq!(kpis.phase_durations_ms["functional"], 15);
        assert_eq!(kpis.rules_failed, 1);
    }
}
