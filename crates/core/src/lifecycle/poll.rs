//! Bounded fixed-delay polling.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::ApiError;

/// Stand-in deadline for budgets too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Result of a poll loop.
#[derive(Debug, Clone)]
pub struct Polled<T> {
    /// Last value read; `None` when the budget ran out before any read
    /// produced one.
    pub value: Option<T>,
    /// False when the budget ran out before `value` satisfied the predicate.
    pub done: bool,
    pub reads: u32,
    pub elapsed: Duration,
}

/// Read until `is_done` holds or `timeout` elapses.
///
/// The first read happens immediately. After each unfinished read the loop
/// sleeps `interval`, clipped to what is left of the budget, and gives up
/// without another read once the budget is spent. Each read is handed the
/// deadline and returns `Ok(None)` when it ran into it. Errors from `read`
/// end the loop.
pub async fn poll_until<T, E, F, Fut, P>(
    interval: Duration,
    timeout: Duration,
    mut read: F,
    is_done: P,
) -> Result<Polled<T>, E>
where
    F: FnMut(Instant) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    P: Fn(&T) -> bool,
{
    let started = Instant::now();
    let deadline = started
        .checked_add(timeout)
        .unwrap_or_else(|| started + FAR_FUTURE);
    let mut last = None;
    let mut reads = 0;

    loop {
        let value = read(deadline).await?;
        reads += 1;

        match value {
            Some(value) if is_done(&value) => {
                return Ok(Polled {
                    value: Some(value),
                    done: true,
                    reads,
                    elapsed: started.elapsed(),
                });
            }
            Some(value) => last = Some(value),
            None => {
                return Ok(Polled {
                    value: last,
                    done: false,
                    reads,
                    elapsed: started.elapsed(),
                });
            }
        }

        let elapsed = started.elapsed();
        if elapsed < timeout {
            tokio::time::sleep(interval.min(timeout - elapsed)).await;
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Ok(Polled {
                value: last,
                done: false,
                reads,
                elapsed,
            });
        }
    }
}

/// Why [`retry_transient`] gave up.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Non-transient failure, or transient failures until attempts ran out.
    #[error("{source} (after {attempts} attempt(s))")]
    Exhausted { source: ApiError, attempts: u32 },

    /// The deadline arrived while waiting to retry a transient failure.
    #[error("deadline reached after {attempts} attempt(s), last error: {source}")]
    OutOfTime { source: ApiError, attempts: u32 },
}

impl RetryError {
    pub fn into_parts(self) -> (ApiError, u32) {
        match self {
            RetryError::Exhausted { source, attempts }
            | RetryError::OutOfTime { source, attempts } => (source, attempts),
        }
    }
}

/// Run `op`, retrying transient API errors with linear backoff.
///
/// `max_attempts` counts the first call. Non-transient errors return at once.
/// With a `deadline`, backoff sleeps are clipped to it and no attempt starts
/// once it has passed.
pub async fn retry_transient<T, F, Fut>(
    what: &str,
    max_attempts: u32,
    backoff: Duration,
    deadline: Option<Instant>,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let source = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => e,
            Err(source) => {
                debug!(what, attempt, "Giving up on read: {}", source);
                return Err(RetryError::Exhausted {
                    source,
                    attempts: attempt,
                });
            }
        };

        let mut delay = backoff * attempt;
        if let Some(deadline) = deadline {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                debug!(what, attempt, "Deadline reached, not retrying: {}", source);
                return Err(RetryError::OutOfTime {
                    source,
                    attempts: attempt,
                });
            }
            delay = delay.min(left);
        }

        warn!(what, attempt, max_attempts, "Read failed ({}), retrying in {:?}", source, delay);
        tokio::time::sleep(delay).await;

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            debug!(what, attempt, "Deadline reached while backing off");
            return Err(RetryError::OutOfTime {
                source,
                attempts: attempt,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_at_budget_without_extra_read() {
        let reads = Cell::new(0u32);
        let started = Instant::now();

        let polled = poll_until(
            Duration::from_secs(5),
            Duration::from_secs(20),
            |_| {
                reads.set(reads.get() + 1);
                async { Ok::<_, ()>(Some("pending")) }
            },
            |status| *status == "done",
        )
        .await
        .unwrap();

        assert!(!polled.done);
        assert_eq!(polled.reads, 4);
        assert_eq!(reads.get(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_clips_last_sleep_to_budget() {
        let polled = poll_until(
            Duration::from_secs(7),
            Duration::from_secs(10),
            |_| async { Ok::<_, ()>(Some(0)) },
            |_| false,
        )
        .await
        .unwrap();

        // reads at 0s and 7s, then a 3s sleep to the budget
        assert_eq!(polled.reads, 2);
        assert_eq!(polled.elapsed, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_immediately_when_done() {
        let started = Instant::now();
        let polled = poll_until(
            Duration::from_secs(60),
            Duration::from_secs(600),
            |_| async { Ok::<_, ()>(Some(true)) },
            |done| *done,
        )
        .await
        .unwrap();

        assert!(polled.done);
        assert_eq!(polled.reads, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_propagates_read_error() {
        let result = poll_until(
            Duration::from_secs(1),
            Duration::from_secs(10),
            |_| async { Err::<Option<u32>, _>("boom") },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap_err(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_recovers() {
        let calls = Cell::new(0u32);
        let started = Instant::now();

        let value = retry_transient("status", 3, Duration::from_secs(2), None, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(ApiError::Timeout)
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        // 2s + 4s
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_exhaustion_and_fatal() {
        let err = retry_transient("status", 3, Duration::from_secs(1), None, || async {
            Err::<(), _>(ApiError::ConnectionFailed("refused".into()))
        })
        .await
        .unwrap_err();
        match err {
            RetryError::Exhausted { source, attempts } => {
                assert!(matches!(source, ApiError::ConnectionFailed(_)));
                assert_eq!(attempts, 3);
            }
            other => panic!("Expected Exhausted, got {:?}", other),
        }

        let (err, attempts) = retry_transient("status", 3, Duration::from_secs(1), None, || async {
            Err::<(), _>(ApiError::NotFound("order".into()))
        })
        .await
        .unwrap_err()
        .into_parts();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_is_clipped_to_deadline() {
        let calls = Cell::new(0u32);
        let started = Instant::now();
        let deadline = started + Duration::from_secs(3);

        let err = retry_transient("status", 5, Duration::from_secs(2), Some(deadline), || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(ApiError::Timeout) }
        })
        .await
        .unwrap_err();

        // attempts at 0s and 2s, then the 4s backoff is cut to 1s
        match err {
            RetryError::OutOfTime { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("Expected OutOfTime, got {:?}", other),
        }
        assert_eq!(calls.get(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_out_of_time_ends_poll_with_last_value() {
        let reads = Cell::new(0u32);
        let started = Instant::now();

        let polled = poll_until(
            Duration::from_secs(2),
            Duration::from_secs(10),
            |_| {
                reads.set(reads.get() + 1);
                let n = reads.get();
                async move { Ok::<_, ()>(if n < 3 { Some(n) } else { None }) }
            },
            |_| false,
        )
        .await
        .unwrap();

        assert!(!polled.done);
        assert_eq!(polled.value, Some(2));
        assert_eq!(polled.reads, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_receives_budget_deadline() {
        let started = Instant::now();
        let polled = poll_until(
            Duration::from_secs(1),
            Duration::from_secs(30),
            |deadline| async move { Ok::<_, ()>(Some(deadline)) },
            |_| true,
        )
        .await
        .unwrap();

        assert_eq!(polled.value, Some(started + Duration::from_secs(30)));
    }
}
