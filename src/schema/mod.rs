//! Schema validation for the requirement document.
//!
//! One JSON Schema (draft 7) for the document envelope, one per section `data`.

mod validator;

pub use validator::{SchemaValidator, ValidationReport};
