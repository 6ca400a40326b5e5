//! Order submission, polling and result download.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{OctopodApi, Order, OrderStatus, RemoteFile};
use crate::session::SessionManager;
use crate::transport::FileReference;

use super::config::PollingConfig;
use super::poll::{poll_until, retry_transient, RetryError};
use super::types::{LifecycleError, LifecycleState, PollOutcome, ResultArtifact};

/// Drives a single order from submission to downloaded results.
pub struct OrderLifecycleController {
    api: Arc<dyn OctopodApi>,
    sessions: Arc<SessionManager>,
    config: PollingConfig,
}

impl OrderLifecycleController {
    pub fn new(
        api: Arc<dyn OctopodApi>,
        sessions: Arc<SessionManager>,
        config: PollingConfig,
    ) -> Self {
        Self {
            api,
            sessions,
            config,
        }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    fn read_backoff(&self) -> Duration {
        Duration::from_secs(self.config.read_backoff_secs)
    }

    /// Submit an order for `file`. A rejection is not retried.
    pub async fn submit(
        &self,
        file: &FileReference,
        model_name: &str,
        tags: &[String],
    ) -> Result<Order, LifecycleError> {
        info!(
            file_id = %file.file_id,
            model = model_name,
            state = LifecycleState::Submitting.as_str(),
            "Submitting order"
        );

        let order = self
            .sessions
            .execute(move |token| async move {
                self.api
                    .submit_order(&token, &file.file_id, model_name, tags)
                    .await
            })
            .await
            .map_err(|source| LifecycleError::Submit {
                file_id: file.file_id.clone(),
                source,
            })?;

        info!(
            order_id = %order.order_id,
            status = %order.raw_status,
            "Order submitted"
        );
        Ok(order)
    }

    /// Single status read, with transient retries.
    pub async fn fetch(&self, order_id: &str) -> Result<Order, LifecycleError> {
        self.read_order(order_id, None)
            .await
            .map_err(|e| order_read_error(order_id, e))
    }

    /// Status read that gives up with `Ok(None)` when retries would run past
    /// `deadline`.
    pub async fn fetch_within(
        &self,
        order_id: &str,
        deadline: Instant,
    ) -> Result<Option<Order>, LifecycleError> {
        match self.read_order(order_id, Some(deadline)).await {
            Ok(order) => Ok(Some(order)),
            Err(RetryError::OutOfTime { source, attempts }) => {
                warn!(order_id, attempts, "Out of time while retrying status read: {}", source);
                Ok(None)
            }
            Err(e) => Err(order_read_error(order_id, e)),
        }
    }

    async fn read_order(
        &self,
        order_id: &str,
        deadline: Option<Instant>,
    ) -> Result<Order, RetryError> {
        retry_transient(
            "order status",
            self.config.max_read_attempts,
            self.read_backoff(),
            deadline,
            move || {
                self.sessions
                    .execute(move |token| async move { self.api.get_order(&token, order_id).await })
            },
        )
        .await
    }

    /// Single file read (validation fields included), with transient retries.
    pub async fn read_file(&self, file_id: &str) -> Result<RemoteFile, LifecycleError> {
        self.read_remote_file(file_id, None)
            .await
            .map_err(|e| file_read_error(file_id, e))
    }

    /// File read that gives up with `Ok(None)` when retries would run past
    /// `deadline`.
    pub async fn read_file_within(
        &self,
        file_id: &str,
        deadline: Instant,
    ) -> Result<Option<RemoteFile>, LifecycleError> {
        match self.read_remote_file(file_id, Some(deadline)).await {
            Ok(file) => Ok(Some(file)),
            Err(RetryError::OutOfTime { source, attempts }) => {
                warn!(file_id, attempts, "Out of time while retrying file read: {}", source);
                Ok(None)
            }
            Err(e) => Err(file_read_error(file_id, e)),
        }
    }

    async fn read_remote_file(
        &self,
        file_id: &str,
        deadline: Option<Instant>,
    ) -> Result<RemoteFile, RetryError> {
        retry_transient(
            "file status",
            self.config.max_read_attempts,
            self.read_backoff(),
            deadline,
            move || {
                self.sessions
                    .execute(move |token| async move { self.api.get_file(&token, file_id).await })
            },
        )
        .await
    }

    /// Poll `order` until it is completed, failed or cancelled, or the
    /// `timeout` budget runs out.
    ///
    /// An unrecognised vendor status ends the loop with an error, as does a
    /// zero `poll_interval`.
    pub async fn poll_until_terminal(
        &self,
        order: &Order,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<PollOutcome, LifecycleError> {
        check_poll_interval(poll_interval)?;
        let order_id = order.order_id.as_str();
        info!(
            order_id,
            interval_secs = poll_interval.as_secs(),
            timeout_secs = timeout.as_secs(),
            "Waiting for order"
        );

        let polled = poll_until(
            poll_interval,
            timeout,
            move |deadline| async move {
                let Some(current) = self.fetch_within(order_id, deadline).await? else {
                    return Ok(None);
                };
                if current.status == OrderStatus::Unknown {
                    return Err(LifecycleError::UnknownStatus {
                        order_id: order_id.to_string(),
                        raw_status: current.raw_status,
                    });
                }
                Ok(Some(current))
            },
            |current: &Order| current.status.is_terminal(),
        )
        .await
        .inspect_err(|e| warn!(order_id, "Polling stopped: {}", e))?;

        let last = polled.value.unwrap_or_else(|| order.clone());
        let state = if polled.done {
            LifecycleState::from(last.status)
        } else {
            LifecycleState::TimedOut
        };

        info!(
            order_id,
            state = state.as_str(),
            status = %last.raw_status,
            reads = polled.reads,
            elapsed_secs = polled.elapsed.as_secs(),
            "Order wait finished"
        );

        Ok(PollOutcome {
            order: last,
            state,
            reads: polled.reads,
            elapsed: polled.elapsed,
        })
    }

    /// Download one result of a completed order.
    ///
    /// `None` picks the first result type. A type the order does not offer is
    /// rejected before any request is made.
    pub async fn download_result(
        &self,
        order: &Order,
        result_type: Option<&str>,
    ) -> Result<ResultArtifact, LifecycleError> {
        let order_id = order.order_id.as_str();
        if order.status != OrderStatus::Completed {
            return Err(LifecycleError::NotCompleted {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }

        let result_type = match result_type {
            Some(wanted) => order
                .result_types
                .iter()
                .find(|t| t.as_str() == wanted)
                .ok_or_else(|| LifecycleError::ResultTypeNotOffered {
                    order_id: order_id.to_string(),
                    result_type: wanted.to_string(),
                    available: order.result_types.clone(),
                })?,
            None => order
                .result_types
                .first()
                .ok_or_else(|| LifecycleError::NoResultTypes {
                    order_id: order_id.to_string(),
                })?,
        };
        let result_type = result_type.as_str();

        debug!(order_id, result_type, "Downloading result");
        let downloaded = retry_transient(
            "result download",
            self.config.max_read_attempts,
            self.read_backoff(),
            None,
            move || {
                self.sessions.execute(move |token| async move {
                    self.api
                        .download_result(&token, order_id, result_type)
                        .await
                })
            },
        )
        .await
        .map_err(|e| LifecycleError::Download {
            order_id: order_id.to_string(),
            result_type: result_type.to_string(),
            source: e.into_parts().0,
        })?;

        let filename = downloaded
            .suggested_filename
            .as_deref()
            .and_then(sanitize_filename)
            .unwrap_or_else(|| fallback_filename(order_id, result_type));

        info!(
            order_id,
            result_type,
            filename = %filename,
            bytes = downloaded.content.len(),
            "Result downloaded"
        );
        Ok(ResultArtifact {
            result_type: result_type.to_string(),
            content: downloaded.content,
            filename,
        })
    }
}

/// A zero interval would re-read without pausing.
pub fn check_poll_interval(interval: Duration) -> Result<(), LifecycleError> {
    if interval.is_zero() {
        return Err(LifecycleError::InvalidPollInterval);
    }
    Ok(())
}

fn order_read_error(order_id: &str, e: RetryError) -> LifecycleError {
    let (source, attempts) = e.into_parts();
    LifecycleError::OrderRead {
        order_id: order_id.to_string(),
        attempts,
        source,
    }
}

fn file_read_error(file_id: &str, e: RetryError) -> LifecycleError {
    let (source, attempts) = e.into_parts();
    LifecycleError::FileRead {
        file_id: file_id.to_string(),
        attempts,
        source,
    }
}

/// Last path component of a server-provided name, if anything usable is left.
fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match base {
        "" | "." | ".." => None,
        base => Some(base.to_string()),
    }
}

fn fallback_filename(order_id: &str, result_type: &str) -> String {
    let order_id = sanitize_filename(order_id).unwrap_or_else(|| "order".to_string());
    let result_type = sanitize_filename(result_type).unwrap_or_else(|| "result".to_string());
    format!("{}_{}.bin", order_id, result_type)
}
