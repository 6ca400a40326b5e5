//! End-to-end process lifecycle tests.
//!
//! These tests drive the orchestrator against the mock API, authenticator
//! and bulk transfer:
//! - Upload, validation, submission, polling and download in one run
//! - Transport choice by file size, and reuse of existing remote files
//! - Re-authentication when a token is revoked mid-run
//! - Timing out and resuming an order by id

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use octopod_core::{
    api::ApiError,
    testing::{fixtures, MockAuthenticator, MockBulkTransfer, MockOctopodApi, MockOperation},
    Authenticator, BulkTransfer, Credentials, ErrorKind, FileOrigin, OctopodApi, Orchestrator,
    OrchestratorError, OrderStatus, PollingConfig, ProcessRequest, ResultSelection,
    SessionManager, TransportConfig,
};

const MB: u64 = 1024 * 1024;

/// Test helper wiring an orchestrator to mocks.
struct TestHarness {
    orchestrator: Orchestrator,
    api: Arc<MockOctopodApi>,
    auth: Arc<MockAuthenticator>,
    bulk: Arc<MockBulkTransfer>,
    dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_transport(TransportConfig::default())
    }

    fn with_transport(transport: TransportConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let api = Arc::new(MockOctopodApi::new());
        let auth = Arc::new(MockAuthenticator::new());
        let bulk = Arc::new(MockBulkTransfer::linked_to(Arc::clone(&api)));

        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&auth) as Arc<dyn Authenticator>,
            Credentials::new("user@example.com", "pw"),
        ));
        let orchestrator = Orchestrator::new(
            Arc::clone(&api) as Arc<dyn OctopodApi>,
            sessions,
            transport,
            PollingConfig {
                validation_timeout_secs: 60,
                read_backoff_secs: 1,
                ..Default::default()
            },
        )
        .with_bulk(Arc::clone(&bulk) as Arc<dyn BulkTransfer>, "uploads");

        Self {
            orchestrator,
            api,
            auth,
            bulk,
            dir,
        }
    }

    /// A request for a `size_bytes` file named `sample.vcf`.
    fn request(&self, size_bytes: u64) -> ProcessRequest {
        let path = fixtures::write_sized_file(self.dir.path(), "sample.vcf", size_bytes)
            .expect("Failed to write sample file");
        ProcessRequest::new(path, "skywalker", self.dir.path().join("results"))
            .with_polling(Duration::from_secs(2), Duration::from_secs(60))
    }
}

#[tokio::test(start_paused = true)]
async fn test_small_file_runs_to_completion() {
    let harness = TestHarness::new();
    harness
        .api
        .set_status_script(&["Pending", "Processing", "Processing", "Completed"])
        .await;

    let started = tokio::time::Instant::now();
    let outcome = harness
        .orchestrator
        .process(&harness.request(10 * MB))
        .await
        .expect("process should succeed");
    let elapsed = started.elapsed();

    assert_eq!(outcome.file.origin, FileOrigin::Direct);
    assert_eq!(outcome.order.status, OrderStatus::Completed);

    let uploads = harness.api.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].size_bytes, 10 * MB);
    assert!(harness.bulk.uploads().await.is_empty());

    let submissions = harness.api.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].file_id, outcome.file.file_id);
    assert_eq!(submissions[0].model_name, "skywalker");

    let reads = harness.api.status_reads();
    assert!((3..=4).contains(&reads), "unexpected status reads: {}", reads);
    assert!(
        elapsed >= Duration::from_secs(6) && elapsed <= Duration::from_secs(8),
        "unexpected elapsed time: {:?}",
        elapsed
    );

    assert_eq!(harness.api.downloads().await.len(), 1);
    let path = outcome.path().expect("a result should be written");
    assert!(path.starts_with(harness.dir.path().join("results")));
    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(
        content,
        format!("{}:SUMMARY_CHROMS", outcome.order.order_id)
    );
}

#[tokio::test(start_paused = true)]
async fn test_large_file_goes_through_bulk_transfer() {
    let harness = TestHarness::with_transport(TransportConfig {
        size_threshold_bytes: MB,
        ..Default::default()
    });
    harness.api.set_status_script(&["Processing", "Completed"]).await;

    let outcome = harness
        .orchestrator
        .process(&harness.request(4 * MB))
        .await
        .expect("process should succeed");

    assert_eq!(outcome.file.origin, FileOrigin::Bulk);
    assert!(harness.api.uploads().await.is_empty());

    let bulk_uploads = harness.bulk.uploads().await;
    assert_eq!(bulk_uploads.len(), 1);
    assert_eq!(bulk_uploads[0].remote_name, "sample.vcf");
    assert_eq!(bulk_uploads[0].remote_folder, "uploads");

    let submissions = harness.api.submissions().await;
    assert_eq!(submissions[0].file_id, outcome.file.file_id);
}

#[tokio::test(start_paused = true)]
async fn test_existing_remote_file_is_reused() {
    let harness = TestHarness::new();
    harness
        .api
        .add_file(fixtures::remote_file("file-existing", "sample.vcf"))
        .await;
    harness.api.set_status_script(&["Completed"]).await;

    let outcome = assert_ok!(
        harness
            .orchestrator
            .process(&harness.request(2048).reuse_existing(true))
            .await
    );

    assert_eq!(outcome.file.origin, FileOrigin::Reused);
    assert_eq!(outcome.file.file_id, "file-existing");
    assert!(harness.api.uploads().await.is_empty());
    assert_eq!(harness.api.submissions().await[0].file_id, "file-existing");
}

#[tokio::test(start_paused = true)]
async fn test_revoked_token_triggers_single_relogin() {
    let harness = TestHarness::new();
    harness
        .api
        .set_status_script(&["Pending", "Processing", "Processing", "Completed"])
        .await;

    // The first session dies between the second and third status reads.
    let api = Arc::clone(&harness.api);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        api.revoke_token("token-1").await;
    });

    let outcome = harness
        .orchestrator
        .process(&harness.request(2048))
        .await
        .expect("process should survive the revoked token");

    assert_eq!(outcome.order.status, OrderStatus::Completed);
    assert_eq!(harness.auth.login_count(), 2);
    // The rejected read is replayed with the new token.
    assert_eq!(harness.api.status_reads(), 5);
    assert_eq!(harness.api.submissions().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_status_errors_do_not_abort_polling() {
    let harness = TestHarness::new();
    harness
        .api
        .set_status_script(&["Processing", "Completed"])
        .await;
    harness
        .api
        .queue_error(
            MockOperation::GetOrder,
            ApiError::Server {
                status: 503,
                message: "maintenance".to_string(),
            },
        )
        .await;

    let outcome = harness
        .orchestrator
        .process(&harness.request(2048))
        .await
        .expect("process should succeed");

    assert_eq!(outcome.order.status, OrderStatus::Completed);
    assert_eq!(harness.api.pending_errors(MockOperation::GetOrder).await, 0);
    assert_eq!(harness.api.status_reads(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_order_can_be_resumed() {
    let harness = TestHarness::new();
    harness.api.set_status_script(&["Processing"]).await;
    harness.api.set_result_types(&["SUMMARY_CHROMS", "PCA"]).await;

    let request = harness
        .request(2048)
        .with_polling(Duration::from_secs(5), Duration::from_secs(10))
        .with_result(ResultSelection::All);

    let err = harness
        .orchestrator
        .process(&request)
        .await
        .expect_err("order should time out");
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let order_id = match err {
        OrchestratorError::TimedOut {
            order_id,
            last_status,
            waited_secs,
        } => {
            assert_eq!(last_status, "Processing");
            assert_eq!(waited_secs, 10);
            order_id
        }
        other => panic!("Expected TimedOut, got {:?}", other),
    };
    assert!(harness.api.downloads().await.is_empty());

    harness
        .api
        .set_order_script(&order_id, &["Completed"])
        .await;
    let outcome = harness
        .orchestrator
        .wait(&request.wait_request(order_id.clone()))
        .await
        .expect("resumed wait should succeed");

    assert_eq!(outcome.order.order_id, order_id);
    assert_eq!(outcome.written.len(), 2);
    assert_eq!(harness.api.submissions().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_order_reports_order_failure() {
    let harness = TestHarness::new();
    harness.api.set_status_script(&["Processing", "Failed"]).await;

    let err = assert_err!(harness.orchestrator.process(&harness.request(2048)).await);

    assert_eq!(err.kind(), ErrorKind::OrderFailed);
    assert!(harness.api.downloads().await.is_empty());
}
