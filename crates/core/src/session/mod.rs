//! Authenticated session lifecycle.

mod manager;
mod types;

pub use manager::SessionManager;
pub use types::{Credentials, Session};
