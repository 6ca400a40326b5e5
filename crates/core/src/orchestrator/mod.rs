//! Upload-and-process orchestrator.
//!
//! Chains the transport selector and the order lifecycle controller into
//! one call per input file.

mod runner;
mod types;

pub use runner::{validate_model_name, Orchestrator};
pub use types::*;
