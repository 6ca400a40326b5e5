//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the collaborator traits,
//! allowing end-to-end tests of the orchestrator without a vendor account
//! or an SFTP server.
//!
//! # Example
//!
//! ```rust,ignore
//! use octopod_core::testing::{MockAuthenticator, MockBulkTransfer, MockOctopodApi};
//!
//! let api = Arc::new(MockOctopodApi::new());
//! let bulk = MockBulkTransfer::linked_to(Arc::clone(&api));
//! let auth = MockAuthenticator::new();
//!
//! // Configure mock responses
//! api.set_status_script(&["Pending", "Running", "Completed"]).await;
//! api.set_result_types(&["SUMMARY_CHROMS"]).await;
//! ```

mod mock_api;
mod mock_authenticator;
mod mock_transfer;

pub use mock_api::{
    MockOctopodApi, MockOperation, RecordedDownload, RecordedSubmission, RecordedUpload,
};
pub use mock_authenticator::MockAuthenticator;
pub use mock_transfer::{MockBulkTransfer, RecordedBulkUpload};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::fs::File;
    use std::io;
    use std::path::{Path, PathBuf};

    use chrono::DateTime;

    use crate::api::{Order, OrderStatus, RemoteFile};
    use crate::transport::{FileOrigin, FileReference};

    /// A validated remote file created on 2024-01-01.
    pub fn remote_file(id: &str, name: &str) -> RemoteFile {
        RemoteFile {
            id: id.to_string(),
            name: name.to_string(),
            size_bytes: Some(1024),
            created_at: DateTime::from_timestamp(1_704_067_200, 0),
            check_completed: true,
            acceptable: Some(true),
            amount_of_samples: Some(1),
            validation_message: None,
        }
    }

    /// A reference to a directly uploaded file.
    pub fn direct_file(file_id: &str) -> FileReference {
        FileReference {
            file_id: file_id.to_string(),
            name: "sample.vcf".to_string(),
            size_bytes: 1024,
            origin: FileOrigin::Direct,
        }
    }

    /// An order with the given vendor status.
    pub fn order(order_id: &str, raw_status: &str, result_types: &[&str]) -> Order {
        Order {
            order_id: order_id.to_string(),
            status: OrderStatus::from_vendor(raw_status),
            raw_status: raw_status.to_string(),
            result_types: result_types.iter().map(|t| t.to_string()).collect(),
            created_at: None,
        }
    }

    /// Create `dir/name` with a length of `size_bytes` (sparse where supported).
    pub fn write_sized_file(dir: &Path, name: &str, size_bytes: u64) -> io::Result<PathBuf> {
        let path = dir.join(name);
        let file = File::create(&path)?;
        file.set_len(size_bytes)?;
        Ok(path)
    }
}
