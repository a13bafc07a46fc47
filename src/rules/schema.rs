//! Rule schema definitions.
//!
//! Defines the JSON/YAML structure of rule-set files. Conditions and actions
//! are closed tagged unions, so a rule with a malformed `check` or `params`
//! is rejected when the rule set is loaded, not when it is evaluated.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rule severity. Declaration order is priority order, so sorting ascending
/// puts `Critical` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Label as written in rule files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule category; one rule-set file per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCategory {
    CodeGeneration,
    Validation,
    ErrorResolution,
}

impl RuleCategory {
    pub const ALL: [Self; 3] = [Self::CodeGeneration, Self::Validation, Self::ErrorResolution];

    /// Category name, also the rule-set file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code-generation",
            Self::Validation => "validation",
            Self::ErrorResolution => "error-resolution",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown rule category '{s}'"))
    }
}

/// A declarative WHEN-THEN unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// What the rule is for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Category (must match the rule-set file it is declared in)
    pub category: RuleCategory,

    /// Phases this rule applies to
    pub phase: BTreeSet<String>,

    /// Priority
    pub severity: Severity,

    /// Disabled rules are kept for listing but never evaluated
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// When the rule fires
    pub condition: Condition,

    /// What happens when it fires
    pub action: Action,

    /// Post-condition confirming the action worked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<RuleValidation>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// Whether the rule is enabled and declared for `phase`.
    pub fn applies_to(&self, phase: &str) -> bool {
        self.enabled && self.phase.contains(phase)
    }
}

/// Predicate description, dispatched on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "check",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Condition {
    /// Always holds
    Always,

    /// A file matching `path` is in the snapshot (`*.ext` matches by suffix)
    FileExists { path: String },

    /// A file matching `path` has content matching the regex `pattern`
    FileContains { path: String, pattern: String },

    /// A dotted `key` exists in the package config (and equals `equals`, if given)
    PackageConfig {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equals: Option<Value>,
    },

    /// The serialized context contains `pattern` (as a regex when `regex` is set)
    ContextMatch {
        pattern: String,
        #[serde(default)]
        regex: bool,
    },

    /// `context.error` matches the regex `pattern` with optional `flags` (`i`, `m`, `s`, `x`)
    Custom {
        pattern: String,
        #[serde(default)]
        flags: String,
    },
}

impl Condition {
    /// Condition type names understood by the engine.
    pub const TYPES: [&'static str; 6] =
        ["always", "file-exists", "file-contains", "package-config", "context-match", "custom"];

    /// Compile the regex this condition evaluates, if it has one.
    pub fn compile_pattern(&self) -> Option<Result<Regex, regex::Error>> {
        match self {
            Self::FileContains { pattern, .. } => Some(Regex::new(pattern)),
            Self::ContextMatch { pattern, regex: true } => Some(Regex::new(pattern)),
            Self::Custom { pattern, flags } => Some(build_flagged_regex(pattern, flags)),
            _ => None,
        }
    }
}

/// Build a regex from a pattern and JS-style flags.
///
/// Also accepts the literal form `/pattern/flags`. `i`, `m`, `s` and `x` map
/// to regex options; `g`, `y` and `u` have no meaning for a single match test
/// and are ignored. Any other flag is an error.
pub fn build_flagged_regex(pattern: &str, flags: &str) -> Result<Regex, regex::Error> {
    let (pattern, flags) = match pattern.strip_prefix('/').and_then(|p| p.rsplit_once('/')) {
        Some((body, literal_flags))
            if flags.is_empty() && literal_flags.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            (body, literal_flags)
        }
        _ => (pattern, flags),
    };

    if let Some(unknown) = flags.chars().find(|c| !"imsxgyu".contains(*c)) {
        return Err(regex::Error::Syntax(format!("unsupported regex flag '{unknown}' in '{flags}'")));
    }

    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
}

/// Effect applied when the condition holds, dispatched on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "params",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    /// Render a named template with context variables
    UseTemplate {
        template: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },

    /// Describe required/forbidden patterns; the caller applies them
    EnforcePattern {
        #[serde(default)]
        required: Vec<String>,
        #[serde(default)]
        forbidden: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        files: Option<String>,
    },

    /// Run an external check command in the context's working directory
    RunValidation {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Search/replace fix descriptor
    ApplyFix {
        search: String,
        replace: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default)]
        examples: Vec<FixExample>,
    },

    /// Stop the current phase
    AbortWithError { message: String },
}

impl Action {
    /// Action type names understood by the engine.
    pub const TYPES: [&'static str; 5] =
        ["use-template", "enforce-pattern", "run-validation", "apply-fix", "abort-with-error"];

    /// Type name as written in rule files.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::UseTemplate { .. } => "use-template",
            Self::EnforcePattern { .. } => "enforce-pattern",
            Self::RunValidation { .. } => "run-validation",
            Self::ApplyFix { .. } => "apply-fix",
            Self::AbortWithError { .. } => "abort-with-error",
        }
    }
}

/// Illustrative before/after pair for a fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixExample {
    pub before: String,
    pub after: String,
}

/// Post-condition check run after a successful action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleValidation {
    /// Command to run
    pub command: String,

    /// Exit code that counts as success
    #[serde(default)]
    pub expected_exit_code: i32,

    /// Substring that must appear in stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}
