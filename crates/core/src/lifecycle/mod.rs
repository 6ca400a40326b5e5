//! Order lifecycle: submit, poll until terminal, download results.

mod config;
mod controller;
mod poll;
mod types;

pub use config::PollingConfig;
pub use controller::{check_poll_interval, OrderLifecycleController};
pub use poll::{poll_until, retry_transient, Polled, RetryError};
pub use types::*;
