//! Rule-set loader.
//!
//! Parses rule-set files (JSON or YAML arrays of rules) into [`Rule`]s.
//! Entries whose condition or action type is unknown are dropped with a
//! warning; entries of a known type with a malformed shape fail the load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::schema::{Action, Condition, Rule, RuleCategory};
use crate::error::{Error, Result};

/// On-disk format of a rule-set file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    Json,
    Yaml,
}

impl RuleFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

fn builtin_source(category: RuleCategory) -> &'static str {
    match category {
        RuleCategory::CodeGeneration => include_str!("builtin/code-generation.json"),
        RuleCategory::Validation => include_str!("builtin/validation.json"),
        RuleCategory::ErrorResolution => include_str!("builtin/error-resolution.json"),
    }
}

/// Parse a rule-set file from a string.
pub fn parse_rule_set_str(
    content: &str,
    format: RuleFormat,
    category: RuleCategory,
    source_name: &str,
) -> Result<Vec<Rule>> {
    let load_err = |reason: String| Error::RuleEngineLoad {
        source_name: source_name.to_string(),
        reason,
    };

    let entries: Vec<Value> = match format {
        RuleFormat::Json => serde_json::from_str(content).map_err(|e| load_err(e.to_string()))?,
        RuleFormat::Yaml => serde_yaml::from_str(content).map_err(|e| load_err(e.to_string()))?,
    };

    let mut rules = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let id = entry.get("id").and_then(Value::as_str).unwrap_or("<no id>").to_string();

        if let Some(unknown) = unknown_type(&entry) {
            tracing::warn!(source = source_name, rule = %id, kind = unknown, "Skipping rule of unknown type");
            continue;
        }

        let rule: Rule = serde_json::from_value(entry)
            .map_err(|e| load_err(format!("rule #{} ('{id}'): {e}", i + 1)))?;
        validate_rule(&rule, category).map_err(load_err)?;
        rules.push(rule);
    }

    Ok(rules)
}

/// Parse a rule-set file from disk.
pub fn parse_rule_set(path: &Path, category: RuleCategory) -> Result<Vec<Rule>> {
    let source_name = path.display().to_string();
    let format = RuleFormat::from_path(path).ok_or_else(|| Error::RuleEngineLoad {
        source_name: source_name.clone(),
        reason: "expected a .json, .yaml or .yml file".to_string(),
    })?;
    let content = std::fs::read_to_string(path).map_err(|e| Error::RuleEngineLoad {
        source_name: source_name.clone(),
        reason: e.to_string(),
    })?;
    parse_rule_set_str(&content, format, category, &source_name)
}

/// Rules shipped with the binary for one category.
pub fn builtin_rules(category: RuleCategory) -> Result<Vec<Rule>> {
    parse_rule_set_str(
        builtin_source(category),
        RuleFormat::Json,
        category,
        &format!("builtin:{category}"),
    )
}

/// Find `<dir>/<category>.{json,yaml,yml}`.
pub fn find_rule_file(dir: &Path, category: RuleCategory) -> Option<PathBuf> {
    ["json", "yaml", "yml"]
        .iter()
        .map(|ext| dir.join(format!("{}.{ext}", category.as_str())))
        .find(|path| path.is_file())
}

/// Load every category: a file in `dir` replaces the built-in set for its
/// category; categories without a file fall back to the built-ins when
/// `include_builtin` is set.
pub fn load_rules(dir: Option<&Path>, include_builtin: bool) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();

    for category in RuleCategory::ALL {
        match dir.and_then(|d| find_rule_file(d, category)) {
            Some(path) => {
                let loaded = parse_rule_set(&path, category)?;
                tracing::debug!(path = ?path, count = loaded.len(), "Loaded rule set");
                rules.extend(loaded);
            }
            None if include_builtin => rules.extend(builtin_rules(category)?),
            None => {}
        }
    }

    check_unique_ids(&rules)?;
    Ok(rules)
}

/// Reject duplicate rule ids across all categories.
pub fn check_unique_ids(rules: &[Rule]) -> Result<()> {
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.id.as_str()) {
            return Err(Error::RuleEngineLoad {
                source_name: rule.category.to_string(),
                reason: format!("duplicate rule id '{}'", rule.id),
            });
        }
    }
    Ok(())
}

fn unknown_type(entry: &Value) -> Option<&'static str> {
    let type_of = |key: &str| entry.get(key).and_then(|v| v.get("type")).and_then(Value::as_str);

    if let Some(kind) = type_of("condition") {
        if !Condition::TYPES.contains(&kind) {
            return Some("condition");
        }
    }
    if let Some(kind) = type_of("action") {
        if !Action::TYPES.contains(&kind) {
            return Some("action");
        }
    }
    None
}

/// Validate a rule for common errors.
fn validate_rule(rule: &Rule, category: RuleCategory) -> std::result::Result<(), String> {
    if rule.id.trim().is_empty() {
        return Err("rule id cannot be empty".to_string());
    }

    if rule.phase.is_empty() {
        return Err(format!("rule '{}' declares no phase", rule.id));
    }

    if rule.category != category {
        return Err(format!(
            "rule '{}' has category '{}' but is declared in the '{category}' set",
            rule.id, rule.category
        ));
    }

    if let Some(Err(e)) = rule.condition.compile_pattern() {
        return Err(format!("rule '{}' has an invalid pattern: {e}", rule.id));
    }

    if category == RuleCategory::ErrorResolution && !matches!(rule.condition, Condition::Custom { .. })
    {
        tracing::warn!(rule = %rule.id, "Error-resolution rule without a custom condition is never suggested");
    }

    Ok(())
}
