//! Orchestrator implementation.
//!
//! Drives one file through the whole flow:
//! - Upload (or reuse) through the transport selector
//! - Wait for remote validation
//! - Submit, poll, download

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::{OctopodApi, Order, RemoteFile, ValidationState};
use crate::lifecycle::{
    check_poll_interval, poll_until, LifecycleError, LifecycleState, OrderLifecycleController,
    PollOutcome, PollingConfig, ResultArtifact,
};
use crate::session::SessionManager;
use crate::transfer::BulkTransfer;
use crate::transport::{FileReference, TransportConfig, TransportSelector};

use super::types::{
    OrchestratorError, OrderOutcome, ProcessOutcome, ProcessRequest, ResultSelection, WaitRequest,
};

/// Model names are passed to the vendor verbatim.
pub fn validate_model_name(model_name: &str) -> Result<(), OrchestratorError> {
    let valid = !model_name.is_empty()
        && model_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidModelName(model_name.to_string()))
    }
}

/// Upload → validate → submit → poll → download.
pub struct Orchestrator {
    transport: TransportSelector,
    lifecycle: OrderLifecycleController,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn OctopodApi>,
        sessions: Arc<SessionManager>,
        transport: TransportConfig,
        polling: PollingConfig,
    ) -> Self {
        Self {
            transport: TransportSelector::new(Arc::clone(&api), Arc::clone(&sessions), transport),
            lifecycle: OrderLifecycleController::new(api, sessions, polling),
        }
    }

    /// Enable bulk uploads for files above the size threshold.
    pub fn with_bulk(mut self, bulk: Arc<dyn BulkTransfer>, folder: impl Into<String>) -> Self {
        self.transport = self.transport.with_bulk(bulk, folder);
        self
    }

    /// Run the full flow for one file.
    ///
    /// Every log line of the run carries a fresh `run_id`.
    pub async fn process(
        &self,
        request: &ProcessRequest,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let span = info_span!(
            "process",
            run_id = %Uuid::new_v4(),
            model = %request.model_name
        );
        self.process_inner(request).instrument(span).await
    }

    async fn process_inner(
        &self,
        request: &ProcessRequest,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        validate_model_name(&request.model_name)?;
        check_poll_interval(request.poll_interval)?;

        let file = self
            .upload(&request.file_path, request.check_if_file_exists)
            .await?;
        self.wait_for_validation(&file, request.poll_interval).await?;

        let order = self
            .lifecycle
            .submit(&file, &request.model_name, &request.tags)
            .await?;

        let wait = request.wait_request(order.order_id.clone());
        let outcome = self.finish(order, &wait).await?;

        info!(
            file_id = %file.file_id,
            order_id = %outcome.order.order_id,
            written = outcome.written.len(),
            "Processing finished"
        );
        Ok(ProcessOutcome {
            file,
            order: outcome.order,
            written: outcome.written,
        })
    }

    /// Upload (or reuse) without starting an order.
    pub async fn upload(
        &self,
        file_path: &Path,
        reuse_if_exists: bool,
    ) -> Result<FileReference, OrchestratorError> {
        let threshold = self.transport.config().size_threshold_bytes;
        Ok(self
            .transport
            .select_and_upload(file_path, threshold, reuse_if_exists)
            .await?)
    }

    /// One status read of an existing order.
    pub async fn status(&self, order_id: &str) -> Result<Order, OrchestratorError> {
        Ok(self.lifecycle.fetch(order_id).await?)
    }

    /// Wait for an existing order, e.g. one whose earlier wait timed out,
    /// and download its results.
    pub async fn wait(&self, request: &WaitRequest) -> Result<OrderOutcome, OrchestratorError> {
        check_poll_interval(request.poll_interval)?;
        let order = self.lifecycle.fetch(&request.order_id).await?;
        self.finish(order, request).await
    }

    /// Poll until the file's remote validation settles.
    pub async fn wait_for_validation(
        &self,
        file: &FileReference,
        poll_interval: Duration,
    ) -> Result<RemoteFile, OrchestratorError> {
        check_poll_interval(poll_interval)?;
        let file_id = file.file_id.as_str();
        let budget = Duration::from_secs(self.lifecycle.config().validation_timeout_secs);
        let lifecycle = &self.lifecycle;

        info!(file_id, "Waiting for file validation");
        let polled = poll_until(
            poll_interval,
            budget,
            move |deadline| lifecycle.read_file_within(file_id, deadline),
            |remote: &RemoteFile| remote.validation_state() != ValidationState::Pending,
        )
        .await?;

        let state = polled.value.as_ref().map(RemoteFile::validation_state);
        match (polled.value, state) {
            (Some(remote), Some(ValidationState::Validated)) => {
                info!(file_id, reads = polled.reads, "File validated");
                Ok(remote)
            }
            (_, Some(ValidationState::Failed { reason })) => {
                Err(OrchestratorError::ValidationFailed {
                    file_id: file_id.to_string(),
                    reason,
                })
            }
            _ => Err(OrchestratorError::ValidationTimedOut {
                file_id: file_id.to_string(),
                waited_secs: polled.elapsed.as_secs(),
            }),
        }
    }

    /// Poll `order` to a terminal status, then download what was asked for.
    async fn finish(
        &self,
        order: Order,
        request: &WaitRequest,
    ) -> Result<OrderOutcome, OrchestratorError> {
        let outcome = if order.status.is_terminal() {
            PollOutcome {
                state: LifecycleState::from(order.status),
                order,
                reads: 0,
                elapsed: Duration::ZERO,
            }
        } else {
            self.lifecycle
                .poll_until_terminal(&order, request.poll_interval, request.timeout)
                .await?
        };

        let order = outcome.order;
        match outcome.state {
            LifecycleState::Completed => {}
            LifecycleState::Failed => {
                return Err(OrchestratorError::OrderFailed {
                    order_id: order.order_id,
                    status: order.raw_status,
                })
            }
            LifecycleState::Cancelled => {
                return Err(OrchestratorError::OrderCancelled {
                    order_id: order.order_id,
                    status: order.raw_status,
                })
            }
            LifecycleState::TimedOut => {
                return Err(OrchestratorError::TimedOut {
                    order_id: order.order_id,
                    last_status: order.raw_status,
                    waited_secs: outcome.elapsed.as_secs(),
                })
            }
            _ => {
                return Err(LifecycleError::UnknownStatus {
                    order_id: order.order_id,
                    raw_status: order.raw_status,
                }
                .into())
            }
        }

        let written = self
            .download(&order, &request.download_folder, &request.result)
            .await?;
        Ok(OrderOutcome { order, written })
    }

    async fn download(
        &self,
        order: &Order,
        folder: &Path,
        selection: &ResultSelection,
    ) -> Result<Vec<PathBuf>, OrchestratorError> {
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(|source| OrchestratorError::Write {
                path: folder.to_path_buf(),
                source,
            })?;

        match selection {
            ResultSelection::First => {
                let artifact = self.lifecycle.download_result(order, None).await?;
                Ok(vec![write_artifact(folder, &artifact).await?])
            }
            ResultSelection::Named(result_type) => {
                let artifact = self
                    .lifecycle
                    .download_result(order, Some(result_type))
                    .await?;
                Ok(vec![write_artifact(folder, &artifact).await?])
            }
            ResultSelection::All => {
                let mut written = Vec::new();
                for result_type in &order.result_types {
                    let artifact = match self
                        .lifecycle
                        .download_result(order, Some(result_type))
                        .await
                    {
                        Ok(artifact) => artifact,
                        Err(e) => {
                            warn!(order_id = %order.order_id, result_type = %result_type, "Skipping result: {}", e);
                            continue;
                        }
                    };
                    match write_artifact(folder, &artifact).await {
                        Ok(path) => written.push(path),
                        Err(e) => {
                            warn!(order_id = %order.order_id, result_type = %result_type, "Skipping result: {}", e)
                        }
                    }
                }

                if written.is_empty() {
                    return Err(OrchestratorError::NoResultsWritten {
                        order_id: order.order_id.clone(),
                    });
                }
                Ok(written)
            }
        }
    }
}

async fn write_artifact(
    folder: &Path,
    artifact: &ResultArtifact,
) -> Result<PathBuf, OrchestratorError> {
    let path = folder.join(&artifact.filename);
    tokio::fs::write(&path, &artifact.content)
        .await
        .map_err(|source| OrchestratorError::Write {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), bytes = artifact.content.len(), "Result written");
    Ok(path)
}
