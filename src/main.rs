//! Reqflow - requirement-to-deployment pipeline.
//!
//! Drives a requirement document through the phase pipeline and exposes the
//! document store and rule engine on the command line.

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reqflow::document::{DocumentStore, ProjectMeta, SectionName};
use reqflow::pipeline::{PhaseState, Pipeline, RunReport};
use reqflow::rules::{Action, RuleCategory, RuleContext, RuleEngine};
use reqflow::{Config, JsonlPatternLog, SchemaValidator};

/// Requirement-to-deployment pipeline
#[derive(Parser)]
#[command(name = "reqflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding requirement documents
    #[arg(long, global = true, env = "REQFLOW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory holding rule sets and templates
    #[arg(long, global = true, env = "REQFLOW_RULES_DIR")]
    rules_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty requirement document
    Init {
        /// Document id
        id: String,

        /// Project name
        #[arg(long)]
        name: String,

        /// Project path (working directory for validation commands)
        #[arg(long)]
        path: Option<String>,
    },

    /// Run every phase that has not completed yet
    Run {
        /// Document id
        id: String,

        /// Markdown requirement file
        #[arg(short, long)]
        requirement: PathBuf,

        /// Project name (defaults to the document id)
        #[arg(long)]
        name: Option<String>,

        /// Skip the rule engine
        #[arg(long)]
        no_rules: bool,
    },

    /// Re-run a phase and every phase after it
    Resume {
        /// Document id
        id: String,

        /// Phase to resume from
        #[arg(long)]
        from: SectionName,

        /// Requirement file (needed when resuming from functional)
        #[arg(short, long)]
        requirement: Option<PathBuf>,
    },

    /// Show document progress
    Status {
        /// Document id
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one section
    Show {
        /// Document id
        id: String,

        /// Section name
        section: SectionName,
    },

    /// Validate a document file against its schemas
    Validate {
        /// Path to a document file
        file: PathBuf,
    },

    /// Inspect and apply rules
    Rules {
        #[command(subcommand)]
        operation: RulesOperation,
    },

    /// Suggest a fix for an error message
    Fix {
        /// Error message
        message: String,

        /// Project directory to snapshot as context
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RulesOperation {
    /// List loaded rules
    List {
        /// Only rules enabled for this phase
        #[arg(short, long)]
        phase: Option<String>,

        /// Only rules of this category
        #[arg(short, long)]
        category: Option<RuleCategory>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Apply a phase's rules to a directory
    Apply {
        /// Rule phase
        phase: String,

        /// Directory to snapshot
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

/// Resolved settings shared by every command.
struct Settings {
    config: Config,
    data_dir: PathBuf,
    rules_dir: Option<PathBuf>,
}

impl Settings {
    fn store(&self) -> Result<DocumentStore> {
        Ok(DocumentStore::open(&self.data_dir)?)
    }

    fn engine(&self) -> Result<RuleEngine> {
        let engine = RuleEngine::load(self.rules_dir.as_deref(), self.config.rules.include_builtin)?;
        Ok(engine.with_validation_timeout(self.config.rules.validation_timeout()))
    }

    fn pipeline(&self, apply_rules: bool) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(self.store()?, self.engine()?)
            .with_rules(apply_rules && self.config.pipeline.apply_rules);
        if let Some(path) = self.config.pattern_log() {
            pipeline = pipeline.with_pattern_sink(Arc::new(JsonlPatternLog::new(path)));
        }
        Ok(pipeline)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let settings = Settings {
        data_dir: cli.data_dir.unwrap_or_else(|| config.documents_dir()),
        rules_dir: cli.rules_dir.or_else(|| config.rules_dir()),
        config,
    };

    // Handle commands
    match cli.command {
        Commands::Init { id, name, path } => cmd_init(&settings, &id, &name, path)?,
        Commands::Run { id, requirement, name, no_rules } => {
            cmd_run(&settings, &id, &requirement, name, !no_rules)?;
        }
        Commands::Resume { id, from, requirement } => {
            cmd_resume(&settings, &id, from, requirement.as_deref())?;
        }
        Commands::Status { id, format } => cmd_status(&settings, &id, &format)?,
        Commands::Show { id, section } => cmd_show(&settings, &id, section)?,
        Commands::Validate { file } => cmd_validate(&file)?,
        Commands::Rules { operation } => match operation {
            RulesOperation::List { phase, category, format } => {
                cmd_rules_list(&settings, phase.as_deref(), category, &format)?;
            }
            RulesOperation::Apply { phase, dir } => cmd_rules_apply(&settings, &phase, &dir)?,
        },
        Commands::Fix { message, dir, format } => {
            cmd_fix(&settings, &message, dir.as_deref(), &format)?;
        }
        Commands::Completions { shell } => cmd_completions(shell),
    }

    Ok(())
}

/// Create an empty document.
fn cmd_init(settings: &Settings, id: &str, name: &str, path: Option<String>) -> Result<()> {
    let store = settings.store()?;
    if store.exists(id)? {
        anyhow::bail!("Document '{id}' already exists");
    }

    let mut project = ProjectMeta::new(name);
    if let Some(path) = path {
        project = project.with_path(path);
    }

    let doc = store.load_or_create(id, project)?;
    store.save(&doc)?;

    println!("Created document '{id}' at {}", store.path_for(id)?.display());
    Ok(())
}

/// Run the pipeline from the first incomplete phase.
fn cmd_run(
    settings: &Settings,
    id: &str,
    requirement: &Path,
    name: Option<String>,
    apply_rules: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(requirement)
        .with_context(|| format!("Failed to read requirement {}", requirement.display()))?;
    let project = ProjectMeta::new(name.unwrap_or_else(|| id.to_string()));
    let pipeline = settings.pipeline(apply_rules)?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(pipeline.run_reporting(id, project, Some(&text)));

    print_report(&outcome.report);
    outcome.into_result()?;
    Ok(())
}

/// Re-run from a phase.
fn cmd_resume(
    settings: &Settings,
    id: &str,
    from: SectionName,
    requirement: Option<&Path>,
) -> Result<()> {
    let text = requirement
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read requirement {}", path.display()))
        })
        .transpose()?;
    let pipeline = settings.pipeline(true)?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(pipeline.resume_reporting(id, from, text.as_deref()));

    print_report(&outcome.report);
    outcome.into_result()?;
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Run {} for '{}'", report.run_id, report.document_id);
    for phase in &report.phases {
        let mark = match phase.state {
            PhaseState::Completed => "✓",
            PhaseState::Failed => "✗",
            PhaseState::Running => "…",
            PhaseState::Pending => " ",
        };
        let mut line = format!("  {mark} {:<15}", phase.phase.as_str());
        if phase.reused {
            line.push_str(" (already completed)");
        } else if phase.state == PhaseState::Completed {
            line.push_str(&format!(" {}ms", phase.duration_ms));
        }
        if let Some(rules) = &phase.rule_report {
            line.push_str(&format!(
                "  rules: {} checked, {} applied, {} failed",
                rules.rules_checked, rules.rules_applied, rules.rules_failed
            ));
        }
        println!("{line}");
    }
    println!("Status: {}", report.status);
}

/// Show document progress.
fn cmd_status(settings: &Settings, id: &str, format: &str) -> Result<()> {
    let store = settings.store()?;
    let doc = store.load(id)?;
    let summary = DocumentStore::summary(&doc);
    let fingerprint = store.fingerprint(id)?;

    match format {
        "json" => {
            let status = json!({
                "id": id,
                "project": doc.project,
                "summary": summary,
                "fingerprint": fingerprint,
                "kpis": doc.kpis(),
                "executionLog": doc.execution_log(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        _ => {
            println!("Document: {id}");
            println!("Project: {}", doc.project.name);
            if let Some(path) = &doc.project.path {
                println!("Path: {path}");
            }
            println!(
                "Status: {} ({}/{} phases)",
                summary.status, summary.completed_count, summary.total_phases
            );
            if let Some(next) = summary.next_phase {
                println!("Next phase: {next}");
            }
            println!("Fingerprint: {fingerprint}");

            println!("\nSections:");
            for name in SectionName::ALL {
                match DocumentStore::get_section(&doc, name) {
                    Some(section) => println!(
                        "  [x] {:<15} {} by {}",
                        name.as_str(),
                        section.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        section.produced_by
                    ),
                    None => println!("  [ ] {}", name.as_str()),
                }
            }

            let kpis = doc.kpis();
            println!(
                "\nRules: {} checked, {} applied, {} failed",
                kpis.rules_checked, kpis.rules_applied, kpis.rules_failed
            );
            println!("Log entries: {}", doc.execution_log().len());
        }
    }

    Ok(())
}

/// Print one section as JSON.
fn cmd_show(settings: &Settings, id: &str, name: SectionName) -> Result<()> {
    let doc = settings.store()?.load(id)?;
    let Some(section) = DocumentStore::get_section(&doc, name) else {
        anyhow::bail!("Section '{name}' of '{id}' has not been produced yet");
    };
    println!("{}", serde_json::to_string_pretty(section)?);
    Ok(())
}

/// Validate a document file: the document schema plus every present section.
fn cmd_validate(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let validator = SchemaValidator::new()?;
    let mut errors = validator.validate_document(&value).errors;

    for name in SectionName::ALL {
        if let Some(data) = value.get(name.as_str()).and_then(|s| s.get("data")) {
            let report = validator.validate_section(name.as_str(), data);
            errors.extend(report.errors.into_iter().map(|e| format!("{name}: {e}")));
        }
    }

    if errors.is_empty() {
        println!("✓ {} is valid", file.display());
        return Ok(());
    }

    for error in &errors {
        println!("  - {error}");
    }
    anyhow::bail!("{} violation(s) in {}", errors.len(), file.display())
}

/// List rules.
fn cmd_rules_list(
    settings: &Settings,
    phase: Option<&str>,
    category: Option<RuleCategory>,
    format: &str,
) -> Result<()> {
    let engine = settings.engine()?;
    let rules: Vec<_> = match phase {
        Some(phase) => engine.rules_for_phase(phase, category),
        None => engine
            .rules()
            .iter()
            .filter(|r| category.map_or(true, |c| r.category == c))
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rules)?),
        _ => {
            for rule in &rules {
                let phases: Vec<_> = rule.phase.iter().map(String::as_str).collect();
                println!(
                    "{:<9} {:<28} {:<17} [{}]{}",
                    rule.severity.as_str(),
                    rule.id,
                    rule.category.as_str(),
                    phases.join(", "),
                    if rule.enabled { "" } else { " (disabled)" }
                );
            }
            println!("\nTotal: {} rules", rules.len());
        }
    }

    Ok(())
}

/// Apply a phase's rules to a directory snapshot.
fn cmd_rules_apply(settings: &Settings, phase: &str, dir: &Path) -> Result<()> {
    let engine = settings.engine()?;
    let project = dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "project".to_string());
    let ctx = RuleContext::snapshot_dir(dir)?
        .with_variable("project", project)
        .with_variable("phase", phase);

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(engine.apply_rules(phase, &ctx))?;

    for outcome in &report.details {
        let mark = if outcome.success { "✓" } else { "✗" };
        println!("{mark} [{}] {}: {}", outcome.severity, outcome.rule_id, outcome.message);
    }
    println!(
        "\nRules: {} checked, {} applied, {} failed",
        report.rules_checked, report.rules_applied, report.rules_failed
    );
    Ok(())
}

/// Suggest a fix for an error message.
fn cmd_fix(settings: &Settings, message: &str, dir: Option<&Path>, format: &str) -> Result<()> {
    let engine = settings.engine()?;
    let ctx = match dir {
        Some(dir) => RuleContext::snapshot_dir(dir)?,
        None => RuleContext::new(std::env::current_dir()?),
    };

    let suggestion = engine.suggest_fix(message, &ctx);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&suggestion)?);
        return Ok(());
    }

    let Some(suggestion) = suggestion else {
        println!("No matching fix for this error");
        return Ok(());
    };

    println!("{} ({}) [{}]", suggestion.rule_name, suggestion.rule_id, suggestion.severity);
    if let Some(description) = &suggestion.description {
        println!("{description}");
    }
    if let Action::ApplyFix { search, replace, file, examples } = &suggestion.fix {
        println!("\nReplace: {search}");
        println!("With:    {replace}");
        if let Some(file) = file {
            println!("In:      {file}");
        }
        for example in examples {
            println!("\n  before: {}\n  after:  {}", example.before, example.after);
        }
    } else {
        println!("\n{}", serde_json::to_string_pretty(&suggestion.fix)?);
    }
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "reqflow", &mut io::stdout());
}
