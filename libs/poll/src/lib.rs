//! Bounded polling primitives.
//!
//! Every wait in a nodecheck run goes through [`poll_until`] so that no loop
//! can hang forever. A check reports one of:
//!
//! - **Ready**: the condition holds, polling stops with the value.
//! - **Pending**: not yet, poll again after the interval.
//! - **Retry**: the check itself failed transiently, poll again.
//! - **Abort**: the check observed a state it can never recover from.
//!
//! # Invariants
//!
//! - The check runs at least once, even with a zero timeout
//! - No check starts after the deadline has passed
//! - Time is measured with `tokio::time`, so paused-clock tests are exact

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Polling errors.
#[derive(Debug, Error)]
pub enum PollError<E: Display> {
    /// The deadline passed before the check reported ready.
    #[error("timeout after {elapsed:?} waiting for {what}")]
    Timeout {
        what: String,
        elapsed: Duration,
        attempts: u32,
        /// Most recent transient error, if the last attempts were failing.
        last_error: Option<E>,
    },

    /// The check gave up.
    #[error("{what}: {error}")]
    Aborted { what: String, error: E },
}

impl<E: Display> PollError<E> {
    /// Returns true if the deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result of one check.
#[derive(Debug)]
pub enum Check<T, E> {
    Ready(T),
    Pending,
    Retry(E),
    Abort(E),
}

impl<T, E> Check<T, E> {
    /// Map a fallible lookup into a check: errors are retried,
    /// `None` keeps waiting.
    pub fn from_result(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(value)) => Check::Ready(value),
            Ok(None) => Check::Pending,
            Err(e) => Check::Retry(e),
        }
    }
}

/// Deadline and cadence for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum time to wait.
    pub timeout: Duration,

    /// Time between checks.
    pub interval: Duration,
}

impl PollConfig {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Poll `check` until it reports ready, aborts, or the deadline passes.
pub async fn poll_until<T, E, F, Fut>(
    what: &str,
    config: PollConfig,
    mut check: F,
) -> Result<T, PollError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Check<T, E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;

        match check().await {
            Check::Ready(value) => {
                debug!(what, attempts, elapsed_ms = start.elapsed().as_millis() as u64, "Poll ready");
                return Ok(value);
            }
            Check::Pending => {
                last_error = None;
            }
            Check::Retry(e) => {
                warn!(what, attempts, error = %e, "Poll check failed, retrying");
                last_error = Some(e);
            }
            Check::Abort(error) => {
                return Err(PollError::Aborted {
                    what: what.to_string(),
                    error,
                });
            }
        }

        let elapsed = start.elapsed();
        if elapsed + config.interval > config.timeout {
            return Err(PollError::Timeout {
                what: what.to_string(),
                elapsed,
                attempts,
                last_error,
            });
        }

        tokio::time::sleep(config.interval).await;
    }
}

/// Default poll deadline.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10 * 60); // 10 minutes

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
