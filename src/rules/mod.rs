//! Declarative rule engine.
//!
//! Rules are WHEN-THEN units loaded once from per-category rule sets
//! (`code-generation`, `validation`, `error-resolution`). The engine
//! evaluates their conditions against a [`RuleContext`], executes the
//! matching actions in severity order, and maps error messages to fixes.

mod context;
mod engine;
mod loader;
mod runner;
mod schema;
mod templates;

pub use context::{path_matches, RuleContext};
pub use engine::{AbortSignal, ActionOutcome, FixSuggestion, RuleEngine, RuleReport};
pub use loader::{
    builtin_rules, check_unique_ids, find_rule_file, load_rules, parse_rule_set,
    parse_rule_set_str, RuleFormat,
};
pub use runner::{CommandOutcome, CommandRunner, ShellRunner, DEFAULT_VALIDATION_TIMEOUT};
pub use schema::{
    build_flagged_regex, Action, Condition, FixExample, Rule, RuleCategory, RuleValidation,
    Severity,
};
pub use templates::{interpolate, Rendered, TemplateRegistry};
