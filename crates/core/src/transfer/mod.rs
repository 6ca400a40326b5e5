//! Bulk (large payload) transfer channel.
//!
//! Files above the direct-upload threshold are pushed over SFTP; the API
//! indexes them afterwards.

mod sftp;
mod types;

pub use sftp::SftpTransfer;
pub use types::*;
