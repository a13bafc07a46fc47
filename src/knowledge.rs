//! Pattern log written after successful runs.
//!
//! The pipeline only ever appends to a [`PatternSink`]; nothing in the core
//! reads it back, so it cannot influence phase contracts.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{Kpis, SectionName};

/// One successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub document_id: String,
    pub run_id: Uuid,
    pub project: String,
    pub completed_phases: Vec<SectionName>,
    pub kpis: Kpis,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only destination for pattern records.
pub trait PatternSink: Send + Sync {
    fn record(&self, record: &PatternRecord) -> anyhow::Result<()>;
}

/// JSON-lines file sink.
#[derive(Debug, Clone)]
pub struct JsonlPatternLog {
    path: PathBuf,
}

impl JsonlPatternLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, oldest first.
    pub fn read_all(&self) -> anyhow::Result<Vec<PatternRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        std::fs::read_to_string(&self.path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
            .collect()
    }
}

impl PatternSink for JsonlPatternLog {
    fn record(&self, record: &PatternRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }
}
