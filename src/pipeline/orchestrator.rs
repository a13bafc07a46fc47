//! Phase pipeline orchestrator.
//!
//! Runs phases strictly in declared order. Each step resolves its inputs,
//! invokes the producer, validates the output, consults the rule engine and
//! only then writes and saves the section. Any failure leaves the persisted
//! document at the last completed phase.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::phases::{
    default_phases, resolve_inputs, validate_phase_order, PhaseDescriptor, PhaseInput, PhaseProducer,
};
use super::producers::default_producers;
use crate::document::{Document, DocumentStore, LogStatus, ProjectMeta, RunStatus, SectionName};
use crate::error::{Error, Result};
use crate::knowledge::{PatternRecord, PatternSink};
use crate::rules::{RuleContext, RuleEngine, RuleReport};

/// Per-phase state within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// What happened to one phase during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    pub phase: SectionName,
    pub state: PhaseState,

    /// Completed by an earlier run and not executed again
    pub reused: bool,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_report: Option<RuleReport>,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub document_id: String,
    pub run_id: Uuid,
    pub status: RunStatus,
    pub phases: Vec<PhaseRecord>,
}

impl RunReport {
    /// Phases that completed in this run or an earlier one.
    pub fn completed(&self) -> impl Iterator<Item = &PhaseRecord> {
        self.phases.iter().filter(|p| p.state == PhaseState::Completed)
    }

    /// The phase that failed, if any.
    pub fn failed_phase(&self) -> Option<SectionName> {
        self.phases.iter().find(|p| p.state == PhaseState::Failed).map(|p| p.phase)
    }
}

/// A run's report together with the error that stopped it, if any.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub error: Option<Error>,
}

impl RunOutcome {
    /// The report on success, the stopping error otherwise.
    pub fn into_result(self) -> Result<RunReport> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.report),
        }
    }
}

/// Sequences phases over one document at a time.
pub struct Pipeline {
    store: DocumentStore,
    engine: RuleEngine,
    phases: Vec<PhaseDescriptor>,
    producers: BTreeMap<SectionName, Arc<dyn PhaseProducer>>,
    sink: Option<Arc<dyn PatternSink>>,
    apply_rules: bool,
}

impl Pipeline {
    /// Pipeline with the default phase order and built-in producers.
    pub fn new(store: DocumentStore, engine: RuleEngine) -> Self {
        Self {
            store,
            engine,
            phases: default_phases(),
            producers: default_producers(),
            sink: None,
            apply_rules: true,
        }
    }

    /// Replace the phase order; it must pass [`validate_phase_order`].
    pub fn with_phases(mut self, phases: Vec<PhaseDescriptor>) -> Result<Self> {
        validate_phase_order(&phases)?;
        self.phases = phases;
        Ok(self)
    }

    /// Replace the producer for one section.
    #[must_use]
    pub fn with_producer(mut self, section: SectionName, producer: Arc<dyn PhaseProducer>) -> Self {
        self.producers.insert(section, producer);
        self
    }

    /// Append a record to `sink` after each fully successful run.
    #[must_use]
    pub fn with_pattern_sink(mut self, sink: Arc<dyn PatternSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Enable or skip rule-engine consultation.
    #[must_use]
    pub fn with_rules(mut self, apply: bool) -> Self {
        self.apply_rules = apply;
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn phases(&self) -> &[PhaseDescriptor] {
        &self.phases
    }

    /// Run every phase whose section is not yet produced.
    pub async fn run(
        &self,
        id: &str,
        project: ProjectMeta,
        requirement: Option<&str>,
    ) -> Result<RunReport> {
        self.run_reporting(id, project, requirement).await.into_result()
    }

    /// [`run`](Self::run), keeping the report when a phase fails.
    pub async fn run_reporting(
        &self,
        id: &str,
        project: ProjectMeta,
        requirement: Option<&str>,
    ) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let prepared = self.store.exists(id).and_then(|existed| {
            let doc = self.store.load_or_create(id, project)?;
            if !existed {
                self.store.save(&doc)?;
            }
            Ok(doc)
        });

        match prepared {
            Ok(doc) => self.drive(doc, 0, true, requirement, run_id).await,
            Err(error) => self.outcome_without_document(id, run_id, error),
        }
    }

    /// Re-run `phase` and every phase after it, replacing their sections.
    pub async fn resume_from(
        &self,
        id: &str,
        phase: SectionName,
        requirement: Option<&str>,
    ) -> Result<RunReport> {
        self.resume_reporting(id, phase, requirement).await.into_result()
    }

    /// [`resume_from`](Self::resume_from), keeping the report when a phase fails.
    pub async fn resume_reporting(
        &self,
        id: &str,
        phase: SectionName,
        requirement: Option<&str>,
    ) -> RunOutcome {
        let run_id = Uuid::new_v4();

        let prepared = self
            .phases
            .iter()
            .position(|p| p.output == phase)
            .ok_or_else(|| Error::PhaseOrder(format!("phase '{phase}' is not part of this pipeline")))
            .and_then(|start| {
                let mut doc = self.store.load(id)?;
                self.store.record_event(
                    &mut doc,
                    phase.as_str(),
                    LogStatus::Resumed,
                    format!("resumed from phase '{phase}'"),
                    Some(run_id),
                );
                self.store.save(&doc)?;
                Ok((doc, start))
            });

        match prepared {
            Ok((doc, start)) => {
                tracing::info!(id, %phase, %run_id, "Resuming run");
                self.drive(doc, start, false, requirement, run_id).await
            }
            Err(error) => self.outcome_without_document(id, run_id, error),
        }
    }

    fn outcome_without_document(&self, id: &str, run_id: Uuid, error: Error) -> RunOutcome {
        let report = RunReport {
            document_id: id.to_string(),
            run_id,
            status: RunStatus::Failed,
            phases: self.pending_records(),
        };
        RunOutcome { report, error: Some(error) }
    }

    fn pending_records(&self) -> Vec<PhaseRecord> {
        self.phases
            .iter()
            .map(|p| PhaseRecord {
                phase: p.output,
                state: PhaseState::Pending,
                reused: false,
                duration_ms: 0,
                rule_report: None,
            })
            .collect()
    }

    async fn drive(
        &self,
        mut doc: Document,
        start: usize,
        skip_completed: bool,
        requirement: Option<&str>,
        run_id: Uuid,
    ) -> RunOutcome {
        let mut report = RunReport {
            document_id: doc.id().to_string(),
            run_id,
            status: RunStatus::InProgress,
            phases: self.pending_records(),
        };

        for (index, phase) in self.phases.iter().enumerate() {
            let record = &mut report.phases[index];

            if index < start || (skip_completed && doc.section(phase.output).is_some()) {
                if doc.section(phase.output).is_some() {
                    record.state = PhaseState::Completed;
                    record.reused = true;
                }
                continue;
            }

            record.state = PhaseState::Running;
            tracing::info!(id = doc.id(), phase = phase.name(), "Phase started");

            match self.run_phase(&mut doc, phase, requirement, run_id).await {
                Ok((duration_ms, rule_report)) => {
                    record.state = PhaseState::Completed;
                    record.duration_ms = duration_ms;
                    record.rule_report = rule_report;
                    tracing::info!(id = doc.id(), phase = phase.name(), duration_ms, "Phase completed");
                }
                Err(error) => {
                    record.state = PhaseState::Failed;
                    report.status = RunStatus::Failed;
                    tracing::error!(id = doc.id(), phase = phase.name(), error = %error, "Phase failed");
                    return RunOutcome { report, error: Some(error) };
                }
            }
        }

        report.status = RunStatus::Completed;
        self.record_pattern(&doc, run_id);
        RunOutcome { report, error: None }
    }

    /// Execute one phase against `doc` and persist its section.
    ///
    /// On error `doc` and the persisted document are left unchanged.
    pub async fn run_phase(
        &self,
        doc: &mut Document,
        phase: &PhaseDescriptor,
        requirement: Option<&str>,
        run_id: Uuid,
    ) -> Result<(u64, Option<RuleReport>)> {
        let started = Instant::now();

        let sections = resolve_inputs(phase, doc, self.store.validator())?;

        let producer = self.producers.get(&phase.output).ok_or_else(|| Error::ProducerFailed {
            phase: phase.name().to_string(),
            source: anyhow::anyhow!("no producer registered"),
        })?;

        let input = PhaseInput {
            document_id: doc.id().to_string(),
            project: doc.project.clone(),
            requirement: requirement.map(str::to_string),
            sections,
        };
        let data = producer.produce(&input).await.map_err(|source| Error::ProducerFailed {
            phase: phase.name().to_string(),
            source,
        })?;

        let validation = self.store.validator().validate_section_data(phase.output, &data);
        if !validation.valid {
            return Err(Error::ContractViolation {
                phase: phase.name().to_string(),
                produced_by: producer.name().to_string(),
                section: phase.output.to_string(),
                violations: validation.errors,
            });
        }

        let rule_report = match phase.rule_phase.as_deref().filter(|_| self.apply_rules) {
            Some(rule_phase) => {
                let mut ctx = self.rule_context(doc, phase, &data);
                // Generated files only exist in memory; check commands need them on disk.
                let _workspace = if ctx.files.is_empty() { None } else { Some(ctx.materialize()?) };
                Some(self.engine.apply_rules(rule_phase, &ctx).await?)
            }
            None => None,
        };

        let mut detail = format!("produced by {}", producer.name());
        if let Some(rules) = &rule_report {
            detail.push_str(&format!(
                "; rules checked {}, applied {}, failed {}",
                rules.rules_checked, rules.rules_applied, rules.rules_failed
            ));
        }

        let mut updated = doc.clone();
        self.store.set_section_for_run(
            &mut updated,
            phase.output,
            data,
            producer.name(),
            Some(run_id),
            Some(detail),
        )?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let kpis = updated.kpis_mut();
        kpis.record_phase(phase.output, duration_ms);
        if let Some(rules) = &rule_report {
            kpis.record_rules(rules.rules_checked, rules.rules_applied, rules.rules_failed);
        }

        self.store.save(&updated)?;
        *doc = updated;
        Ok((duration_ms, rule_report))
    }

    /// Context for a phase's rules: generated files and manifests (including
    /// the section being produced) plus template variables.
    ///
    /// The working directory is the project path (or the store root) until
    /// the caller materializes the files.
    fn rule_context(&self, doc: &Document, phase: &PhaseDescriptor, data: &Value) -> RuleContext {
        let working_dir = doc.project.path.as_deref().map_or_else(
            || self.store.root().to_path_buf(),
            |p| PathBuf::from(shellexpand::tilde(p).into_owned()),
        );

        let mut ctx = RuleContext::new(working_dir)
            .with_variable("project", doc.project.name.as_str())
            .with_variable("phase", phase.name())
            .with_variable("document", doc.id());

        let source = |section: SectionName| {
            if section == phase.output {
                Some(data)
            } else {
                doc.section(section).map(|s| &s.data)
            }
        };

        let entries = [
            (SectionName::Implementation, "files", "path"),
            (SectionName::Deployment, "manifests", "name"),
        ];
        for (section, field, key) in entries {
            let Some(items) = source(section).and_then(|d| d.get(field)).and_then(Value::as_array) else {
                continue;
            };
            for item in items {
                let path = item.get(key).and_then(Value::as_str);
                let content = item.get("content").and_then(Value::as_str);
                if let (Some(path), Some(content)) = (path, content) {
                    ctx = ctx.with_file(path, content);
                }
            }
        }

        ctx.refresh_package_config();
        ctx
    }

    fn record_pattern(&self, doc: &Document, run_id: Uuid) {
        let Some(sink) = &self.sink else { return };

        let record = PatternRecord {
            document_id: doc.id().to_string(),
            run_id,
            project: doc.project.name.clone(),
            completed_phases: doc.completed_sections(),
            kpis: doc.kpis().clone(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = sink.record(&record) {
            tracing::warn!(id = doc.id(), error = %e, "Failed to record run pattern");
        }
    }
}
