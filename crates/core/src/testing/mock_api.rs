//! Mock Octopod API for testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::api::{
    AccessToken, ApiError, DownloadedResult, FileQuery, OctopodApi, Order, OrderStatus,
    RemoteFile,
};

/// Remote operations, for targeting injected errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Upload,
    ListFiles,
    GetFile,
    SubmitOrder,
    GetOrder,
    DownloadResult,
}

/// A recorded direct upload.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub file_id: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

/// A recorded order submission.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub order_id: String,
    pub file_id: String,
    pub model_name: String,
    pub tags: Vec<String>,
}

/// A recorded result download.
#[derive(Debug, Clone)]
pub struct RecordedDownload {
    pub order_id: String,
    pub result_type: String,
}

#[derive(Debug, Clone)]
struct MockFile {
    /// State once the remote check has run.
    checked: RemoteFile,
    /// `get_file` reads left before the check completes.
    reads_until_checked: u32,
}

impl MockFile {
    fn snapshot(&self) -> RemoteFile {
        if self.reads_until_checked == 0 {
            return self.checked.clone();
        }
        RemoteFile {
            check_completed: false,
            acceptable: None,
            amount_of_samples: None,
            validation_message: None,
            ..self.checked.clone()
        }
    }
}

#[derive(Debug, Clone)]
struct MockOrder {
    order: Order,
    /// Raw statuses returned by successive reads; the last one sticks.
    script: VecDeque<String>,
}

#[derive(Debug, Clone)]
struct MockContent {
    content: Vec<u8>,
    filename: Option<String>,
}

/// Mock implementation of the OctopodApi trait.
///
/// Provides controllable behavior for testing:
/// - Record uploads, submissions and downloads for assertions
/// - Script order statuses read by read
/// - Delay or reject file validation
/// - Inject errors per operation, or revoke tokens to force re-authentication
///
/// # Example
///
/// ```rust,ignore
/// let api = MockOctopodApi::new();
/// api.set_status_script(&["Pending", "Running", "Completed"]).await;
///
/// // ... run an orchestration ...
///
/// assert_eq!(api.uploads().await.len(), 1);
/// assert_eq!(api.status_reads(), 3);
/// ```
#[derive(Debug)]
pub struct MockOctopodApi {
    files: Arc<RwLock<Vec<MockFile>>>,
    orders: Arc<RwLock<HashMap<String, MockOrder>>>,
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    downloads: Arc<RwLock<Vec<RecordedDownload>>>,
    /// If set, the next operation of any kind fails with this error.
    next_error: Arc<RwLock<Option<ApiError>>>,
    /// Queued errors per operation, consumed one per call.
    errors: Arc<RwLock<HashMap<MockOperation, VecDeque<ApiError>>>>,
    revoked_tokens: Arc<RwLock<HashSet<String>>>,
    /// Status script given to newly submitted orders.
    status_script: Arc<RwLock<Vec<String>>>,
    /// Result types given to newly submitted orders.
    result_types: Arc<RwLock<Vec<String>>>,
    contents: Arc<RwLock<HashMap<String, MockContent>>>,
    validation_delay: Arc<RwLock<u32>>,
    rejection: Arc<RwLock<Option<String>>>,
    id_counter: AtomicU32,
    list_calls: AtomicU32,
    file_reads: AtomicU32,
    status_reads: AtomicU32,
}

impl Default for MockOctopodApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOctopodApi {
    /// Create a mock API. New files validate at once; new orders stay
    /// `Submitted` until a status script says otherwise.
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(Vec::new())),
            orders: Arc::new(RwLock::new(HashMap::new())),
            uploads: Arc::new(RwLock::new(Vec::new())),
            submissions: Arc::new(RwLock::new(Vec::new())),
            downloads: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            errors: Arc::new(RwLock::new(HashMap::new())),
            revoked_tokens: Arc::new(RwLock::new(HashSet::new())),
            status_script: Arc::new(RwLock::new(Vec::new())),
            result_types: Arc::new(RwLock::new(vec!["SUMMARY_CHROMS".to_string()])),
            contents: Arc::new(RwLock::new(HashMap::new())),
            validation_delay: Arc::new(RwLock::new(0)),
            rejection: Arc::new(RwLock::new(None)),
            id_counter: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            file_reads: AtomicU32::new(0),
            status_reads: AtomicU32::new(0),
        }
    }

    /// Pre-populate a file entry, already in its final validation state.
    pub async fn add_file(&self, file: RemoteFile) {
        self.files.write().await.push(MockFile {
            checked: file,
            reads_until_checked: 0,
        });
    }

    /// Pre-populate an order.
    pub async fn add_order(&self, order: Order) {
        self.orders.write().await.insert(
            order.order_id.clone(),
            MockOrder {
                order,
                script: VecDeque::new(),
            },
        );
    }

    /// Script the raw statuses returned by the next reads of an existing order.
    pub async fn set_order_script(&self, order_id: &str, statuses: &[&str]) {
        if let Some(order) = self.orders.write().await.get_mut(order_id) {
            order.script = statuses.iter().map(|s| s.to_string()).collect();
        }
    }

    /// Script the raw statuses of orders submitted from now on.
    pub async fn set_status_script(&self, statuses: &[&str]) {
        *self.status_script.write().await = statuses.iter().map(|s| s.to_string()).collect();
    }

    /// Result types offered by orders submitted from now on.
    pub async fn set_result_types(&self, result_types: &[&str]) {
        *self.result_types.write().await = result_types.iter().map(|s| s.to_string()).collect();
    }

    /// Bytes and suggested filename served for `result_type`.
    pub async fn set_result_content(
        &self,
        result_type: &str,
        content: Vec<u8>,
        filename: Option<&str>,
    ) {
        self.contents.write().await.insert(
            result_type.to_string(),
            MockContent {
                content,
                filename: filename.map(str::to_string),
            },
        );
    }

    /// New files stay pending for this many `get_file` reads.
    pub async fn set_validation_delay(&self, reads: u32) {
        *self.validation_delay.write().await = reads;
    }

    /// New files fail validation with `reason`.
    pub async fn reject_new_files(&self, reason: &str) {
        *self.rejection.write().await = Some(reason.to_string());
    }

    /// Every call made with `token` fails with `Unauthorized` from now on.
    pub async fn revoke_token(&self, token: &str) {
        self.revoked_tokens.write().await.insert(token.to_string());
    }

    /// Configure the next operation, whatever it is, to fail with `error`.
    pub async fn set_next_error(&self, error: ApiError) {
        *self.next_error.write().await = Some(error);
    }

    /// Queue an error for the next call of `operation`.
    pub async fn queue_error(&self, operation: MockOperation, error: ApiError) {
        self.errors
            .write()
            .await
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Queued errors not consumed yet.
    pub async fn pending_errors(&self, operation: MockOperation) -> usize {
        self.errors
            .read()
            .await
            .get(&operation)
            .map_or(0, VecDeque::len)
    }

    /// Index a file as if it arrived through another channel. Returns its id.
    pub async fn register_upload(&self, file_name: &str, size_bytes: u64) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let file_id = format!("file-{:04}", n);

        let rejection = self.rejection.read().await.clone();
        let checked = RemoteFile {
            id: file_id.clone(),
            name: file_name.to_string(),
            size_bytes: Some(size_bytes),
            created_at: Some(Utc::now()),
            check_completed: true,
            acceptable: Some(rejection.is_none()),
            amount_of_samples: Some(if rejection.is_none() { 1 } else { 0 }),
            validation_message: rejection,
        };

        self.files.write().await.push(MockFile {
            checked,
            reads_until_checked: *self.validation_delay.read().await,
        });
        file_id
    }

    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    pub async fn downloads(&self) -> Vec<RecordedDownload> {
        self.downloads.read().await.clone()
    }

    /// Number of `list_files` calls, failed ones included.
    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_file` calls, failed ones included.
    pub fn file_reads(&self) -> u32 {
        self.file_reads.load(Ordering::SeqCst)
    }

    /// Number of `get_order` calls, failed ones included.
    pub fn status_reads(&self) -> u32 {
        self.status_reads.load(Ordering::SeqCst)
    }

    /// Fail the call if its token was revoked or an error is pending.
    async fn check(&self, operation: MockOperation, token: &AccessToken) -> Result<(), ApiError> {
        if self.revoked_tokens.read().await.contains(token.as_str()) {
            return Err(ApiError::Unauthorized("token has expired".to_string()));
        }
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if let Some(err) = self
            .errors
            .write()
            .await
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl OctopodApi for MockOctopodApi {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload_direct(
        &self,
        token: &AccessToken,
        content: Vec<u8>,
        file_name: &str,
    ) -> Result<String, ApiError> {
        self.check(MockOperation::Upload, token).await?;

        let size_bytes = content.len() as u64;
        let file_id = self.register_upload(file_name, size_bytes).await;
        self.uploads.write().await.push(RecordedUpload {
            file_id: file_id.clone(),
            file_name: file_name.to_string(),
            size_bytes,
            timestamp: Utc::now(),
        });
        Ok(file_id)
    }

    async fn list_files(
        &self,
        token: &AccessToken,
        query: &FileQuery,
    ) -> Result<Vec<RemoteFile>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check(MockOperation::ListFiles, token).await?;

        let files = self.files.read().await;
        Ok(files
            .iter()
            .map(MockFile::snapshot)
            .filter(|f| match &query.file {
                Some(wanted) => &f.name == wanted || &f.id == wanted,
                None => true,
            })
            .collect())
    }

    async fn get_file(&self, token: &AccessToken, file_id: &str) -> Result<RemoteFile, ApiError> {
        self.file_reads.fetch_add(1, Ordering::SeqCst);
        self.check(MockOperation::GetFile, token).await?;

        let mut files = self.files.write().await;
        let file = files
            .iter_mut()
            .find(|f| f.checked.id == file_id)
            .ok_or_else(|| ApiError::NotFound(format!("file {}", file_id)))?;

        let snapshot = file.snapshot();
        file.reads_until_checked = file.reads_until_checked.saturating_sub(1);
        Ok(snapshot)
    }

    async fn submit_order(
        &self,
        token: &AccessToken,
        file_id: &str,
        model_name: &str,
        tags: &[String],
    ) -> Result<Order, ApiError> {
        self.check(MockOperation::SubmitOrder, token).await?;

        let n = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let order = Order {
            order_id: format!("order-{:04}", n),
            status: OrderStatus::Pending,
            raw_status: "Submitted".to_string(),
            result_types: self.result_types.read().await.clone(),
            created_at: Some(Utc::now()),
        };

        self.submissions.write().await.push(RecordedSubmission {
            order_id: order.order_id.clone(),
            file_id: file_id.to_string(),
            model_name: model_name.to_string(),
            tags: tags.to_vec(),
        });
        self.orders.write().await.insert(
            order.order_id.clone(),
            MockOrder {
                order: order.clone(),
                script: self.status_script.read().await.iter().cloned().collect(),
            },
        );
        Ok(order)
    }

    async fn get_order(&self, token: &AccessToken, order_id: &str) -> Result<Order, ApiError> {
        self.status_reads.fetch_add(1, Ordering::SeqCst);
        self.check(MockOperation::GetOrder, token).await?;

        let mut orders = self.orders.write().await;
        let entry = orders
            .get_mut(order_id)
            .ok_or_else(|| ApiError::NotFound(format!("order {}", order_id)))?;

        if let Some(raw) = entry.script.pop_front() {
            entry.order.status = OrderStatus::from_vendor(&raw);
            entry.order.raw_status = raw;
        }
        Ok(entry.order.clone())
    }

    async fn download_result(
        &self,
        token: &AccessToken,
        order_id: &str,
        result_type: &str,
    ) -> Result<DownloadedResult, ApiError> {
        self.check(MockOperation::DownloadResult, token).await?;

        let offered = self
            .orders
            .read()
            .await
            .get(order_id)
            .map(|o| o.order.result_types.iter().any(|t| t == result_type))
            .ok_or_else(|| ApiError::NotFound(format!("order {}", order_id)))?;
        if !offered {
            return Err(ApiError::NotFound(format!(
                "result type {} of order {}",
                result_type, order_id
            )));
        }

        self.downloads.write().await.push(RecordedDownload {
            order_id: order_id.to_string(),
            result_type: result_type.to_string(),
        });

        let result = match self.contents.read().await.get(result_type) {
            Some(mock) => DownloadedResult {
                content: mock.content.clone(),
                suggested_filename: mock.filename.clone(),
            },
            None => DownloadedResult {
                content: format!("{}:{}", order_id, result_type).into_bytes(),
                suggested_filename: None,
            },
        };
        Ok(result)
    }
}
