//! Phase pipeline.
//!
//! Eight phases, each producing one document section from the sections
//! before it:
//!
//! ```text
//! functional -> technical -> architecture -> testing
//!     -> implementation -> review -> documentation -> deployment
//! ```

mod orchestrator;
mod phases;
mod producers;

pub use orchestrator::{PhaseRecord, PhaseState, Pipeline, RunOutcome, RunReport};
pub use phases::{
    default_phases, resolve_inputs, validate_phase_order, InputRequirement, PhaseDescriptor,
    PhaseInput, PhaseProducer,
};
pub use producers::{default_producers, functional as parse_requirement, BuiltinProducer};
