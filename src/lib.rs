#![allow(clippy::format_push_string)]
#![allow(clippy::unused_self)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::case_sensitive_file_extension_comparisons)]

//! # Reqflow
//!
//! Turns a requirement document into progressively richer artifacts:
//! functional breakdown, technical spec, architecture, tests,
//! implementation, review, documentation and deployment.
//!
//! The core is a shared-document pipeline:
//!
//! - **Document store**: one persisted JSON document per requirement run,
//!   holding one section per phase plus an append-only execution log
//! - **Schema validator**: JSON Schema contracts for the document and every section
//! - **Rule engine**: declarative condition/action rules for code generation,
//!   validation and error resolution
//! - **Pipeline**: runs the phases in order and enforces their hand-off contracts
//!
//! ## Quick Start
//!
//! ```bash
//! reqflow run todo-app --requirement requirement.md --name "Todo App"
//! reqflow status todo-app
//! reqflow fix "ReferenceError: require is not defined in ES module scope"
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod config;
pub mod document;
pub mod error;
pub mod knowledge;
pub mod pipeline;
pub mod rules;
pub mod schema;

// Re-export commonly used types
pub use config::Config;
pub use document::{Document, DocumentStore, ProjectMeta, SectionName};
pub use error::{Error, Result};
pub use knowledge::{JsonlPatternLog, PatternRecord, PatternSink};
pub use pipeline::{Pipeline, RunReport};
pub use rules::{RuleContext, RuleEngine};
pub use schema::SchemaValidator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "reqflow";
