//! Octopod vendor API abstraction.
//!
//! This module provides the `Authenticator` and `OctopodApi` traits that the
//! orchestration core calls through, plus the reqwest-backed implementation.

mod http;
mod types;

pub use http::HttpOctopodClient;
pub use types::*;
