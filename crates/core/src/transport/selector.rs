//! Transport selection, dedup-by-reuse and upload retries.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{FileQuery, OctopodApi, RemoteFile};
use crate::session::SessionManager;
use crate::transfer::BulkTransfer;

use super::config::TransportConfig;
use super::types::{FileOrigin, FileReference, TransportError, TransportKind};

/// Pick the channel for a file of `size_bytes`. The threshold itself is direct.
pub fn select_transport(size_bytes: u64, size_threshold_bytes: u64) -> TransportKind {
    if size_bytes <= size_threshold_bytes {
        TransportKind::Direct
    } else {
        TransportKind::Bulk
    }
}

/// Newest `created_at` first, missing timestamps last, then lowest id.
fn newest_first(a: &RemoteFile, b: &RemoteFile) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Choose the remote file to reuse among same-name candidates.
///
/// Files that failed validation are never reused.
pub fn pick_reusable(candidates: &[RemoteFile]) -> Option<&RemoteFile> {
    candidates
        .iter()
        .filter(|f| !f.validation_state().is_failed())
        .min_by(|a, b| newest_first(a, b))
}

/// Uploads a local file through the right channel, or finds an existing copy.
pub struct TransportSelector {
    api: Arc<dyn OctopodApi>,
    sessions: Arc<SessionManager>,
    bulk: Option<Arc<dyn BulkTransfer>>,
    bulk_folder: String,
    config: TransportConfig,
}

impl TransportSelector {
    pub fn new(
        api: Arc<dyn OctopodApi>,
        sessions: Arc<SessionManager>,
        config: TransportConfig,
    ) -> Self {
        Self {
            api,
            sessions,
            bulk: None,
            bulk_folder: String::new(),
            config,
        }
    }

    /// Enable the bulk channel, uploading into `folder` on the remote side.
    pub fn with_bulk(mut self, bulk: Arc<dyn BulkTransfer>, folder: impl Into<String>) -> Self {
        self.bulk = Some(bulk);
        self.bulk_folder = folder.into();
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Get `file_path` onto the remote service and return its reference.
    ///
    /// With `reuse_if_exists`, a same-name remote file that has not failed
    /// validation is returned instead of uploading.
    pub async fn select_and_upload(
        &self,
        file_path: &Path,
        size_threshold_bytes: u64,
        reuse_if_exists: bool,
    ) -> Result<FileReference, TransportError> {
        if size_threshold_bytes == 0 {
            return Err(TransportError::InvalidThreshold);
        }

        let unreadable = |message: String| TransportError::FileUnreadable {
            path: file_path.display().to_string(),
            message,
        };

        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if !metadata.is_file() {
            return Err(unreadable("not a regular file".to_string()));
        }
        let size_bytes = metadata.len();

        let name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| unreadable("file name is not valid UTF-8".to_string()))?;

        if reuse_if_exists {
            let candidates = self.list_named(name).await?;
            if let Some(existing) = pick_reusable(&candidates) {
                info!(
                    file_id = %existing.id,
                    name,
                    state = existing.validation_state().as_str(),
                    "Reusing existing remote file"
                );
                return Ok(FileReference {
                    file_id: existing.id.clone(),
                    name: existing.name.clone(),
                    size_bytes: existing.size_bytes.unwrap_or(size_bytes),
                    origin: FileOrigin::Reused,
                });
            }
            debug!(name, candidates = candidates.len(), "No reusable remote file");
        }

        let kind = select_transport(size_bytes, size_threshold_bytes);
        info!(
            name,
            size_bytes,
            threshold = size_threshold_bytes,
            transport = kind.as_str(),
            "Uploading file"
        );

        let file_id = match kind {
            TransportKind::Direct => self.upload_direct(file_path, name).await?,
            TransportKind::Bulk => self.upload_bulk(file_path, name, size_bytes).await?,
        };

        info!(file_id = %file_id, name, "Upload finished");
        Ok(FileReference {
            file_id,
            name: name.to_string(),
            size_bytes,
            origin: kind.into(),
        })
    }

    /// Remote files indexed under exactly `name`.
    async fn list_named(&self, name: &str) -> Result<Vec<RemoteFile>, TransportError> {
        let query = FileQuery::by_name(name);
        let query = &query;
        let files = self
            .sessions
            .execute(move |token| async move { self.api.list_files(&token, query).await })
            .await?;

        Ok(files.into_iter().filter(|f| f.name == name).collect())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.config.upload_backoff_secs.saturating_mul(u64::from(attempt)))
    }

    async fn upload_direct(&self, file_path: &Path, name: &str) -> Result<String, TransportError> {
        let content =
            tokio::fs::read(file_path)
                .await
                .map_err(|e| TransportError::FileUnreadable {
                    path: file_path.display().to_string(),
                    message: e.to_string(),
                })?;

        let content = &content;
        let max_attempts = self.config.max_upload_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .sessions
                .execute(move |token| {
                    let content = content.clone();
                    async move { self.api.upload_direct(&token, content, name).await }
                })
                .await;

            match result {
                Ok(file_id) => return Ok(file_id),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        name,
                        attempt,
                        max_attempts,
                        "Direct upload failed ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(TransportError::UploadFailed {
                        name: name.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn upload_bulk(
        &self,
        file_path: &Path,
        name: &str,
        size_bytes: u64,
    ) -> Result<String, TransportError> {
        let bulk = self
            .bulk
            .as_ref()
            .ok_or(TransportError::BulkNotConfigured { size_bytes })?;

        let known: HashSet<String> = self
            .list_named(name)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();

        let max_attempts = self.config.max_upload_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match bulk.upload(file_path, name, &self.bulk_folder).await {
                Ok(written) => {
                    debug!(name, written, backend = bulk.name(), "Bulk upload complete");
                    break;
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        name,
                        attempt,
                        max_attempts,
                        "Bulk upload failed ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(TransportError::UploadFailed {
                        name: name.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.await_indexed(name, &known).await
    }

    /// Wait for a file id under `name` that was not there before the upload.
    async fn await_indexed(
        &self,
        name: &str,
        known: &HashSet<String>,
    ) -> Result<String, TransportError> {
        let interval = Duration::from_secs(self.config.reflection_poll_secs.max(1));
        let budget = Duration::from_secs(self.config.reflection_timeout_secs);
        let started = Instant::now();

        loop {
            let fresh: Vec<RemoteFile> = self
                .list_named(name)
                .await?
                .into_iter()
                .filter(|f| !known.contains(&f.id))
                .collect();

            if let Some(file) = fresh.iter().min_by(|a, b| newest_first(a, b)) {
                return Ok(file.id.clone());
            }

            let elapsed = started.elapsed();
            if elapsed >= budget {
                return Err(TransportError::NotIndexed {
                    name: name.to_string(),
                    waited_secs: elapsed.as_secs(),
                });
            }

            debug!(name, "Bulk upload not indexed yet");
            tokio::time::sleep(interval.min(budget - elapsed)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, Authenticator};
    use crate::session::Credentials;
    use crate::testing::fixtures::{remote_file, write_sized_file};
    use crate::testing::{MockAuthenticator, MockBulkTransfer, MockOctopodApi, MockOperation};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const THRESHOLD: u64 = 1024;

    fn selector(api: &Arc<MockOctopodApi>) -> TransportSelector {
        let sessions = Arc::new(SessionManager::new(
            Arc::new(MockAuthenticator::new()) as Arc<dyn Authenticator>,
            Credentials::new("user@example.com", "pw"),
        ));
        let config = TransportConfig {
            size_threshold_bytes: THRESHOLD,
            upload_backoff_secs: 1,
            reflection_poll_secs: 5,
            reflection_timeout_secs: 20,
            ..Default::default()
        };
        TransportSelector::new(Arc::clone(api) as Arc<dyn OctopodApi>, sessions, config)
    }

    fn with_bulk(selector: TransportSelector, bulk: &Arc<MockBulkTransfer>) -> TransportSelector {
        selector.with_bulk(Arc::clone(bulk) as Arc<dyn BulkTransfer>, "uploads")
    }

    #[test]
    fn test_select_transport_boundaries() {
        assert_eq!(select_transport(0, 10), TransportKind::Direct);
        assert_eq!(select_transport(10, 10), TransportKind::Direct);
        assert_eq!(select_transport(11, 10), TransportKind::Bulk);
    }

    #[test]
    fn test_pick_reusable_prefers_newest_then_lowest_id() {
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let mut a = remote_file("b-2", "sample.vcf");
        a.created_at = Some(newer);
        let mut b = remote_file("a-1", "sample.vcf");
        b.created_at = Some(older);
        let mut c = remote_file("a-0", "sample.vcf");
        c.created_at = Some(newer);

        let files = vec![a, b, c];
        assert_eq!(pick_reusable(&files).unwrap().id, "a-0");
    }

    #[test]
    fn test_pick_reusable_skips_failed_and_untimestamped_last() {
        let mut failed = remote_file("f-1", "sample.vcf");
        failed.acceptable = Some(false);
        failed.created_at = Some(Utc::now());
        let mut undated = remote_file("f-2", "sample.vcf");
        undated.created_at = None;

        let files = vec![failed.clone(), undated];
        assert_eq!(pick_reusable(&files).unwrap().id, "f-2");
        assert!(pick_reusable(&[failed]).is_none());
    }

    #[tokio::test]
    async fn test_small_file_goes_direct() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "small.vcf", THRESHOLD).unwrap();
        let api = Arc::new(MockOctopodApi::new());

        let file = selector(&api)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap();

        assert_eq!(file.origin, FileOrigin::Direct);
        assert_eq!(file.size_bytes, THRESHOLD);
        assert_eq!(file.name, "small.vcf");
        let uploads = api.uploads().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].file_id, file.file_id);
        assert_eq!(api.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_reuse_hit_skips_upload() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "sample.vcf", 10).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        api.add_file(remote_file("existing-1", "sample.vcf")).await;
        api.add_file(remote_file("other-1", "other.vcf")).await;

        let file = selector(&api)
            .select_and_upload(&path, THRESHOLD, true)
            .await
            .unwrap();

        assert_eq!(file.origin, FileOrigin::Reused);
        assert_eq!(file.file_id, "existing-1");
        assert!(api.uploads().await.is_empty());
    }

    #[tokio::test]
    async fn test_reuse_ignores_failed_candidates() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "sample.vcf", 10).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        let mut failed = remote_file("failed-1", "sample.vcf");
        failed.acceptable = Some(false);
        api.add_file(failed).await;

        let file = selector(&api)
            .select_and_upload(&path, THRESHOLD, true)
            .await
            .unwrap();

        assert_eq!(file.origin, FileOrigin::Direct);
        assert_ne!(file.file_id, "failed-1");
        assert_eq!(api.uploads().await.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_threshold_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "sample.vcf", 10).unwrap();
        let api = Arc::new(MockOctopodApi::new());

        let err = selector(&api)
            .select_and_upload(&path, 0, false)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::InvalidThreshold));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal_without_upload() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockOctopodApi::new());

        let err = selector(&api)
            .select_and_upload(&dir.path().join("absent.vcf"), THRESHOLD, true)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::FileUnreadable { .. }));
        assert_eq!(api.list_calls(), 0);
        assert!(api.uploads().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_upload_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "sample.vcf", 10).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        api.queue_error(MockOperation::Upload, ApiError::ConnectionFailed("reset".into()))
            .await;
        api.queue_error(MockOperation::Upload, ApiError::Timeout).await;

        let started = Instant::now();
        let file = selector(&api)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap();

        assert_eq!(file.origin, FileOrigin::Direct);
        assert_eq!(api.uploads().await.len(), 1);
        // 1s + 2s of linear backoff
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_escalate_to_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "sample.vcf", 10).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        for _ in 0..3 {
            api.queue_error(
                MockOperation::Upload,
                ApiError::Server {
                    status: 503,
                    message: "unavailable".into(),
                },
            )
            .await;
        }

        let err = selector(&api)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap_err();

        match &err {
            TransportError::UploadFailed { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("Expected UploadFailed, got {:?}", other),
        }
        assert_eq!(err.kind(), crate::error::ErrorKind::FatalIo);
        assert!(api.uploads().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_upload_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "sample.vcf", 10).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        api.queue_error(
            MockOperation::Upload,
            ApiError::Rejected {
                status: 400,
                message: "unsupported format".into(),
            },
        )
        .await;
        api.queue_error(MockOperation::Upload, ApiError::Timeout).await;

        let err = selector(&api)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Api(ApiError::Rejected { .. })));
        assert_eq!(api.pending_errors(MockOperation::Upload).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_file_goes_bulk_and_resolves_new_id() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "big.vcf", THRESHOLD + 1).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        api.add_file(remote_file("old-upload", "big.vcf")).await;
        let bulk = Arc::new(MockBulkTransfer::linked_to(Arc::clone(&api)));

        let file = with_bulk(selector(&api), &bulk)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap();

        assert_eq!(file.origin, FileOrigin::Bulk);
        assert_ne!(file.file_id, "old-upload");
        assert!(api.uploads().await.is_empty());

        let transfers = bulk.uploads().await;
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].remote_name, "big.vcf");
        assert_eq!(transfers[0].remote_folder, "uploads");
        assert_eq!(transfers[0].size_bytes, THRESHOLD + 1);
    }

    #[tokio::test]
    async fn test_large_file_without_bulk_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "big.vcf", THRESHOLD + 1).unwrap();
        let api = Arc::new(MockOctopodApi::new());

        let err = selector(&api)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::BulkNotConfigured { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_upload_never_indexed_times_out() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "big.vcf", THRESHOLD + 1).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        let bulk = Arc::new(MockBulkTransfer::new());

        let started = Instant::now();
        let err = with_bulk(selector(&api), &bulk)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::NotIndexed { .. }));
        assert_eq!(bulk.uploads().await.len(), 1);
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(26));
        // snapshot + reads at 0, 5, 10, 15, 20
        assert_eq!(api.list_calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_bulk_failure_is_retried() {
        let dir = TempDir::new().unwrap();
        let path = write_sized_file(dir.path(), "big.vcf", THRESHOLD + 1).unwrap();
        let api = Arc::new(MockOctopodApi::new());
        let bulk = Arc::new(MockBulkTransfer::linked_to(Arc::clone(&api)));
        bulk.queue_error(crate::transfer::TransferError::Remote("channel closed".into()))
            .await;

        let file = with_bulk(selector(&api), &bulk)
            .select_and_upload(&path, THRESHOLD, false)
            .await
            .unwrap();

        assert_eq!(file.origin, FileOrigin::Bulk);
        assert_eq!(bulk.uploads().await.len(), 1);
    }
}
