//! Rule evaluation and execution.
//!
//! The engine owns an immutable rule set loaded at construction. Condition
//! evaluation is pure; action execution only reaches outside the process for
//! `run-validation` commands and rule post-conditions, both of which go
//! through a [`CommandRunner`] and never fail the engine.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::context::RuleContext;
use super::loader::{check_unique_ids, load_rules};
use super::runner::{CommandOutcome, CommandRunner, ShellRunner, DEFAULT_VALIDATION_TIMEOUT};
use super::schema::{Action, Condition, Rule, RuleCategory, Severity};
use super::templates::{interpolate, TemplateRegistry};
use crate::error::{Error, Result};

/// Outcome of executing one rule's action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub rule_id: String,
    pub severity: Severity,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

/// Raised by `abort-with-error`: the caller must stop the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortSignal {
    pub rule_id: String,
    pub message: String,
}

impl fmt::Display for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule '{}' aborted: {}", self.rule_id, self.message)
    }
}

/// Aggregate of one `apply_rules` pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleReport {
    pub phase: String,
    pub rules_checked: usize,
    pub rules_applied: usize,
    pub rules_failed: usize,

    /// One entry per rule whose condition held, in evaluation order
    pub details: Vec<ActionOutcome>,
}

/// Remediation for an error message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSuggestion {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fix: Action,
}

/// Declarative rule engine.
pub struct RuleEngine {
    rules: Vec<Rule>,
    patterns: HashMap<String, Regex>,
    templates: TemplateRegistry,
    runner: Arc<dyn CommandRunner>,
    validation_timeout: Duration,
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rules.len())
            .field("templates", &self.templates.names().collect::<Vec<_>>())
            .field("validation_timeout", &self.validation_timeout)
            .finish_non_exhaustive()
    }
}

impl RuleEngine {
    /// Build an engine over `rules`, compiling every condition pattern up front.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        check_unique_ids(&rules)?;

        let mut patterns = HashMap::new();
        for rule in &rules {
            if let Some(compiled) = rule.condition.compile_pattern() {
                let regex = compiled.map_err(|e| Error::RuleEngineLoad {
                    source_name: rule.category.to_string(),
                    reason: format!("rule '{}' has an invalid pattern: {e}", rule.id),
                })?;
                if let Some(key) = pattern_key(&rule.condition) {
                    patterns.insert(key, regex);
                }
            }
        }

        tracing::debug!(rules = rules.len(), patterns = patterns.len(), "Rule engine ready");

        Ok(Self {
            rules,
            patterns,
            templates: TemplateRegistry::builtin(),
            runner: Arc::new(ShellRunner),
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        })
    }

    /// Engine over the built-in rule sets only.
    pub fn builtin() -> Result<Self> {
        Self::new(load_rules(None, true)?)
    }

    /// Engine over the rule sets in `dir` (falling back to built-ins per
    /// category when `include_builtin`), plus `<dir>/templates/*.tmpl`.
    pub fn load(dir: Option<&Path>, include_builtin: bool) -> Result<Self> {
        let mut engine = Self::new(load_rules(dir, include_builtin)?)?;

        if let Some(template_dir) = dir.map(|d| d.join("templates")).filter(|d| d.is_dir()) {
            engine.templates.load_dir(&template_dir).map_err(|e| Error::RuleEngineLoad {
                source_name: template_dir.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(engine)
    }

    /// Replace the command runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the template registry.
    #[must_use]
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Deadline for `run-validation` actions that do not set `timeoutMs`.
    #[must_use]
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// All loaded rules, enabled or not.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Template registry used by `use-template`.
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Enabled rules for `phase` (and `category`, if given), most severe first.
    pub fn rules_for_phase(&self, phase: &str, category: Option<RuleCategory>) -> Vec<&Rule> {
        by_severity(
            self.rules
                .iter()
                .filter(|r| r.applies_to(phase))
                .filter(|r| category.map_or(true, |c| r.category == c)),
        )
    }

    /// Whether `rule`'s condition holds for `ctx`.
    pub fn evaluate_condition(&self, rule: &Rule, ctx: &RuleContext) -> bool {
        match &rule.condition {
            Condition::Always => true,
            Condition::FileExists { path } => ctx.matching_files(path).next().is_some(),
            Condition::FileContains { path, .. } => self.with_pattern(rule, |re| {
                ctx.matching_files(path).any(|(_, content)| re.is_match(content))
            }),
            Condition::PackageConfig { key, equals } => match ctx.package_value(key) {
                Some(value) => equals.as_ref().map_or(true, |expected| expected == value),
                None => false,
            },
            Condition::ContextMatch { pattern, regex: false } => ctx.serialized().contains(pattern.as_str()),
            Condition::ContextMatch { regex: true, .. } => {
                let serialized = ctx.serialized();
                self.with_pattern(rule, |re| re.is_match(&serialized))
            }
            Condition::Custom { .. } => match ctx.error.as_deref() {
                Some(error) => self.with_pattern(rule, |re| re.is_match(error)),
                None => false,
            },
        }
    }

    fn with_pattern(&self, rule: &Rule, check: impl FnOnce(&Regex) -> bool) -> bool {
        let cached = pattern_key(&rule.condition).and_then(|key| self.patterns.get(&key));
        if let Some(re) = cached {
            return check(re);
        }

        match rule.condition.compile_pattern() {
            Some(Ok(re)) => check(&re),
            Some(Err(e)) => {
                tracing::debug!(rule = %rule.id, error = %e, "Pattern does not compile");
                false
            }
            None => false,
        }
    }

    /// Execute `rule`'s action against `ctx`.
    ///
    /// Rule-level failures come back as `success: false`; only
    /// `abort-with-error` produces an [`AbortSignal`].
    pub async fn execute_action(
        &self,
        rule: &Rule,
        ctx: &RuleContext,
    ) -> std::result::Result<ActionOutcome, AbortSignal> {
        let (success, message, data) = match &rule.action {
            Action::UseTemplate { template, output } => {
                match self.templates.render(template, &ctx.variables) {
                    Some(rendered) => (
                        true,
                        format!("Rendered template '{template}'"),
                        json!({
                            "template": template,
                            "output": output,
                            "content": rendered.content,
                            "unresolved": rendered.unresolved,
                        }),
                    ),
                    None => (
                        false,
                        format!("Template '{template}' not found"),
                        json!({ "template": template }),
                    ),
                }
            }

            Action::EnforcePattern { required, forbidden, files } => {
                let scope = files.as_deref().unwrap_or("*");
                let mut checked = 0;
                let mut violations = Vec::new();

                for (path, content) in ctx.matching_files(scope) {
                    checked += 1;
                    for pattern in forbidden.iter().filter(|p| content.contains(p.as_str())) {
                        violations.push(json!({ "file": path, "pattern": pattern, "kind": "forbidden" }));
                    }
                    for pattern in required.iter().filter(|p| !content.contains(p.as_str())) {
                        violations.push(json!({ "file": path, "pattern": pattern, "kind": "missing" }));
                    }
                }

                let message = if violations.is_empty() {
                    format!("{checked} file(s) conform")
                } else {
                    format!("{} pattern violation(s) in {checked} file(s)", violations.len())
                };
                (
                    violations.is_empty(),
                    message,
                    json!({
                        "required": required,
                        "forbidden": forbidden,
                        "files": scope,
                        "checkedFiles": checked,
                        "violations": violations,
                    }),
                )
            }

            Action::RunValidation { command, timeout_ms } => {
                let timeout = timeout_ms.map_or(self.validation_timeout, Duration::from_millis);
                let command = interpolate(command, &ctx.variables).content;
                self.run_command(&command, ctx, timeout, 0, None).await
            }

            Action::ApplyFix { search, replace, file, examples } => (
                true,
                format!("Fix available: {}", rule.name),
                json!({
                    "search": search,
                    "replace": replace,
                    "file": file,
                    "examples": examples,
                }),
            ),

            Action::AbortWithError { message } => {
                tracing::warn!(rule = %rule.id, message = %message, "Rule requested abort");
                return Err(AbortSignal { rule_id: rule.id.clone(), message: message.clone() });
            }
        };

        let mut outcome =
            ActionOutcome { rule_id: rule.id.clone(), severity: rule.severity, success, message, data };

        if outcome.success {
            if let Some(validation) = &rule.validation {
                let (ok, message, data) = self
                    .run_command(
                        &interpolate(&validation.command, &ctx.variables).content,
                        ctx,
                        self.validation_timeout,
                        validation.expected_exit_code,
                        validation.expected_output.as_deref(),
                    )
                    .await;
                if !ok {
                    outcome.success = false;
                    outcome.message = format!("Post-condition failed: {message}");
                }
                if let Value::Object(map) = &mut outcome.data {
                    map.insert("validation".to_string(), data);
                }
            }
        }

        Ok(outcome)
    }

    async fn run_command(
        &self,
        command: &str,
        ctx: &RuleContext,
        timeout: Duration,
        expected_exit_code: i32,
        expected_output: Option<&str>,
    ) -> (bool, String, Value) {
        match self.runner.run(command, &ctx.working_dir, timeout).await {
            CommandOutcome::Completed { exit_code, stdout, stderr, duration } => {
                let output_ok = expected_output.map_or(true, |needle| stdout.contains(needle));
                let success = exit_code == expected_exit_code && output_ok;
                let message = if success {
                    format!("'{command}' passed")
                } else if !output_ok {
                    format!("'{command}' output did not contain the expected text")
                } else {
                    format!("'{command}' exited with {exit_code}")
                };
                (
                    success,
                    message,
                    json!({
                        "command": command,
                        "exitCode": exit_code,
                        "stdout": stdout,
                        "stderr": stderr,
                        "durationMs": duration.as_millis() as u64,
                    }),
                )
            }
            CommandOutcome::TimedOut { after } => (
                false,
                format!("'{command}' timed out after {}ms", timeout.as_millis()),
                json!({
                    "command": command,
                    "timedOut": true,
                    "timeoutMs": timeout.as_millis() as u64,
                    "elapsedMs": after.as_millis() as u64,
                }),
            ),
            CommandOutcome::SpawnError(error) => (
                false,
                format!("'{command}' could not be started: {error}"),
                json!({ "command": command, "error": error }),
            ),
        }
    }

    /// Evaluate every rule for `phase` in severity order and execute the
    /// actions of those that match.
    ///
    /// Rule failures are recorded in the report. Only `abort-with-error`
    /// returns an error.
    pub async fn apply_rules(&self, phase: &str, ctx: &RuleContext) -> Result<RuleReport> {
        let mut report = RuleReport { phase: phase.to_string(), ..RuleReport::default() };

        for rule in self.rules_for_phase(phase, None) {
            report.rules_checked += 1;

            if !self.evaluate_condition(rule, ctx) {
                tracing::debug!(phase, rule = %rule.id, "Condition not met");
                continue;
            }

            let outcome = self.execute_action(rule, ctx).await.map_err(|abort| Error::Abort {
                rule_id: abort.rule_id,
                phase: phase.to_string(),
                message: abort.message,
            })?;

            tracing::debug!(phase, rule = %rule.id, success = outcome.success, "Rule applied");
            if outcome.success {
                report.rules_applied += 1;
            } else {
                report.rules_failed += 1;
            }
            report.details.push(outcome);
        }

        Ok(report)
    }

    /// Most severe error-resolution rule whose pattern matches `error_message`.
    pub fn suggest_fix(&self, error_message: &str, ctx: &RuleContext) -> Option<FixSuggestion> {
        let ctx = ctx.clone().with_error(error_message);

        let candidates = by_severity(self.rules.iter().filter(|r| {
            r.enabled
                && r.category == RuleCategory::ErrorResolution
                && matches!(r.condition, Condition::Custom { .. })
        }));

        candidates.into_iter().find(|rule| self.evaluate_condition(rule, &ctx)).map(|rule| {
            FixSuggestion {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                severity: rule.severity,
                description: rule.description.clone(),
                fix: rule.action.clone(),
            }
        })
    }
}

/// Stable sort by severity, `Critical` first; ties keep declaration order.
fn by_severity<'a>(rules: impl Iterator<Item = &'a Rule>) -> Vec<&'a Rule> {
    let mut rules: Vec<&Rule> = rules.collect();
    rules.sort_by_key(|r| r.severity);
    rules
}

fn pattern_key(condition: &Condition) -> Option<String> {
    match condition {
        Condition::FileContains { pattern, .. } => Some(format!("file:{pattern}")),
        Condition::ContextMatch { pattern, regex: true } => Some(format!("context:{pattern}")),
        Condition::Custom { pattern, flags } => Some(format!("custom/{flags}:{pattern}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    fn rule(value: Value) -> Rule {
        serde_json::from_value(value).unwrap()
    }

    fn simple(id: &str, severity: &str, condition: Value, action: Value) -> Rule {
        rule(json!({
            "id": id,
            "name": id,
            "category": "validation",
            "phase": ["review"],
            "severity": severity,
            "condition": condition,
            "action": action,
        }))
    }

    fn enforce_todo() -> Value {
        json!({ "type": "enforce-pattern", "params": { "forbidden": ["TODO"] } })
    }

    struct RecordingRunner {
        commands: Mutex<Vec<String>>,
        outcome: CommandOutcome,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &str, _: &Path, _: Duration) -> CommandOutcome {
            self.commands.lock().unwrap().push(command.to_string());
            self.outcome.clone()
        }
    }

    #[test]
    fn test_severity_ordering() {
        let engine = RuleEngine::new(vec![
            simple("low", "LOW", json!({ "type": "always" }), enforce_todo()),
            simple("medium", "MEDIUM", json!({ "type": "always" }), enforce_todo()),
            simple("critical", "CRITICAL", json!({ "type": "always" }), enforce_todo()),
            simple("high", "HIGH", json!({ "type": "always" }), enforce_todo()),
        ])
        .unwrap();

        let ids: Vec<_> = engine.rules_for_phase("review", None).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["critical", "high", "medium", "low"]);
        assert!(engine.rules_for_phase("deployment", None).is_empty());
        assert!(engine.rules_for_phase("review", Some(RuleCategory::ErrorResolution)).is_empty());
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut disabled = simple("off", "CRITICAL", json!({ "type": "always" }), enforce_todo());
        disabled.enabled = false;
        let engine = RuleEngine::new(vec![disabled]).unwrap();
        assert!(engine.rules_for_phase("review", None).is_empty());
        assert_eq!(engine.rules().len(), 1);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let file_rule = simple(
            "creds",
            "HIGH",
            json!({ "type": "file-contains", "check": { "path": "*.js", "pattern": "password\\s*=" } }),
            enforce_todo(),
        );
        let engine = RuleEngine::new(vec![file_rule.clone()]).unwrap();
        let ctx = RuleContext::new(".").with_file("src/db.js", "const password = 'x'");

        let first = engine.evaluate_condition(&file_rule, &ctx);
        assert!(first);
        for _ in 0..100 {
            assert_eq!(engine.evaluate_condition(&file_rule, &ctx), first);
        }
    }

    #[test]
    fn test_condition_types() {
        let engine = RuleEngine::new(Vec::new()).unwrap();
        let ctx = RuleContext::new("/work")
            .with_file("Cargo.toml", "[package]")
            .with_package_config(json!({ "type": "module" }))
            .with_variable("project", "demo");

        let check = |condition: Value| {
            engine.evaluate_condition(&simple("c", "LOW", condition, enforce_todo()), &ctx)
        };

        assert!(check(json!({ "type": "file-exists", "check": { "path": "Cargo.toml" } })));
        assert!(!check(json!({ "type": "file-exists", "check": { "path": "package.json" } })));
        assert!(check(json!({ "type": "package-config", "check": { "key": "type", "equals": "module" } })));
        assert!(!check(json!({ "type": "package-config", "check": { "key": "type", "equals": "commonjs" } })));
        assert!(!check(json!({ "type": "package-config", "check": { "key": "scripts.test" } })));
        assert!(check(json!({ "type": "context-match", "check": { "pattern": "demo" } })));
        assert!(check(json!({ "type": "context-match", "check": { "pattern": "de.o", "regex": true } })));
        assert!(!check(json!({ "type": "custom", "check": { "pattern": "anything" } })));
    }

    #[test]
    fn test_suggest_fix_matches_custom_pattern() {
        let engine = RuleEngine::new(vec![rule(json!({
            "id": "esm-require",
            "name": "ESM require",
            "category": "error-resolution",
            "phase": ["implementation"],
            "severity": "HIGH",
            "condition": { "type": "custom", "check": { "pattern": "/require is not defined/i" } },
            "action": { "type": "apply-fix", "params": { "search": "require(", "replace": "import(" } }
        }))])
        .unwrap();
        let ctx = RuleContext::new(".");

        let suggestion = engine
            .suggest_fix("ReferenceError: require is not defined in ES module scope", &ctx)
            .unwrap();
        assert_eq!(suggestion.rule_id, "esm-require");
        assert!(matches!(suggestion.fix, Action::ApplyFix { .. }));

        assert!(engine.suggest_fix("totally unrelated error", &ctx).is_none());
        assert!(ctx.error.is_none(), "caller context is not mutated");
    }

    #[test]
    fn test_suggest_fix_prefers_most_severe() {
        let make = |id: &str, severity: &str| {
            rule(json!({
                "id": id,
                "name": id,
                "category": "error-resolution",
                "phase": ["deployment"],
                "severity": severity,
                "condition": { "type": "custom", "check": { "pattern": "EADDRINUSE" } },
                "action": { "type": "apply-fix", "params": { "search": "a", "replace": "b" } }
            }))
        };
        let engine = RuleEngine::new(vec![make("low", "LOW"), make("high", "HIGH")]).unwrap();
        let suggestion = engine.suggest_fix("listen EADDRINUSE :::3000", &RuleContext::new(".")).unwrap();
        assert_eq!(suggestion.rule_id, "high");
    }

    #[test]
    fn test_suggest_fix_with_global_literal_flags() {
        let engine = RuleEngine::new(vec![rule(json!({
            "id": "esm-require",
            "name": "ESM require",
            "category": "error-resolution",
            "phase": ["implementation"],
            "severity": "HIGH",
            "condition": { "type": "custom", "check": { "pattern": "/require is not defined/gi" } },
            "action": { "type": "apply-fix", "params": { "search": "require(", "replace": "import(" } }
        }))])
        .unwrap();

        let suggestion = engine
            .suggest_fix("ReferenceError: require is not defined in ES module scope", &RuleContext::new("."));
        assert_eq!(suggestion.map(|s| s.rule_id), Some("esm-require".to_string()));
    }

    #[test]
    fn test_builtin_engine_suggests_esm_fix() {
        let engine = RuleEngine::builtin().unwrap();
        let suggestion = engine
            .suggest_fix("ReferenceError: require is not defined in ES module scope", &RuleContext::new("."))
            .unwrap();
        assert_eq!(suggestion.rule_id, "esm-require-not-defined");
    }

    #[tokio::test]
    async fn test_run_validation_timeout_is_not_fatal() {
        let engine = RuleEngine::new(vec![simple(
            "slow",
            "MEDIUM",
            json!({ "type": "always" }),
            json!({ "type": "run-validation", "params": { "command": "sleep 5" } }),
        )])
        .unwrap()
        .with_validation_timeout(Duration::from_millis(200));

        let report = engine.apply_rules("review", &RuleContext::new(std::env::temp_dir())).await.unwrap();
        assert_eq!(report.rules_checked, 1);
        assert_eq!(report.rules_failed, 1);
        assert!(!report.details[0].success);
        assert_eq!(report.details[0].data["timedOut"], json!(true));
    }

    #[tokio::test]
    async fn test_abort_escalates() {
        let engine = RuleEngine::new(vec![
            simple("stop", "CRITICAL", json!({ "type": "always" }), json!({
                "type": "abort-with-error", "params": { "message": "no secrets" }
            })),
        ])
        .unwrap();

        let err = engine.apply_rules("review", &RuleContext::new(".")).await.unwrap_err();
        match err {
            Error::Abort { rule_id, phase, message } => {
                assert_eq!(rule_id, "stop");
                assert_eq!(phase, "review");
                assert_eq!(message, "no secrets");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_apply_rules_aggregates() {
        let engine = RuleEngine::new(vec![
            simple("markers", "LOW", json!({ "type": "always" }), enforce_todo()),
            simple(
                "readme",
                "HIGH",
                json!({ "type": "always" }),
                json!({ "type": "use-template", "params": { "template": "readme" } }),
            ),
            simple(
                "missing-template",
                "MEDIUM",
                json!({ "type": "always" }),
                json!({ "type": "use-template", "params": { "template": "nope" } }),
            ),
            simple(
                "never",
                "CRITICAL",
                json!({ "type": "file-exists", "check": { "path": "absent.txt" } }),
                enforce_todo(),
            ),
        ])
        .unwrap();

        let ctx = RuleContext::new(".")
            .with_file("src/a.js", "// TODO: finish")
            .with_variable("project", "demo");
        let report = engine.apply_rules("review", &ctx).await.unwrap();

        assert_eq!(report.rules_checked, 4);
        assert_eq!(report.rules_applied, 1);
        assert_eq!(report.rules_failed, 2);
        let ids: Vec<_> = report.details.iter().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["readme", "missing-template", "markers"]);
        assert_eq!(report.details[0].data["unresolved"], json!(["phase"]));
        assert_eq!(report.details[2].data["violations"][0]["file"], json!("src/a.js"));
    }

    #[tokio::test]
    async fn test_post_condition_validation() {
        let mut checked = simple("checked", "HIGH", json!({ "type": "always" }), enforce_todo());
        checked.validation = Some(crate::rules::RuleValidation {
            command: "lint {{ project }}".to_string(),
            expected_exit_code: 0,
            expected_output: Some("clean".to_string()),
        });

        let runner = Arc::new(RecordingRunner {
            commands: Mutex::new(Vec::new()),
            outcome: CommandOutcome::Completed {
                exit_code: 0,
                stdout: "2 warnings".to_string(),
                stderr: String::new(),
                duration: Duration::from_millis(1),
            },
        });
        let engine = RuleEngine::new(vec![checked.clone()]).unwrap().with_runner(runner.clone());

        let ctx = RuleContext::new(".").with_variable("project", "demo");
        let outcome = engine.execute_action(&checked, &ctx).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Post-condition failed"));
        assert_eq!(runner.commands.lock().unwrap().as_slice(), ["lint demo"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let a = simple("dup", "LOW", json!({ "type": "always" }), enforce_todo());
        let err = RuleEngine::new(vec![a.clone(), a]).unwrap_err();
        assert!(matches!(err, Error::RuleEngineLoad { .. }));
    }
}
