//! Upload transport selection.
//!
//! Small files go through the API, large ones through the bulk channel,
//! and an existing remote copy can be reused instead of uploading again.

mod config;
mod selector;
mod types;

pub use config::TransportConfig;
pub use selector::{pick_reusable, select_transport, TransportSelector};
pub use types::*;
