//! Error recovery strategies.
//!
//! Two recovery styles are used by the rig:
//! - [`RetryPolicy`] + [`retry`]: bounded, constant-backoff retries for one-shot
//!   operations such as dialling the controller.
//! - [`FailureTracker`]: per-iteration bookkeeping for polling loops, which never
//!   give up on a device but must not flood the log at 100 Hz while it is failing.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Defines a policy for retrying an operation.
///
/// # Example
///
/// ```rust
/// use drill_daq::error_recovery::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy {
///     max_attempts: 5,
///     backoff_delay: Duration::from_millis(200),
/// };
/// assert_eq!(policy.max_attempts, 5);
/// ```
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// The delay between attempts (constant backoff).
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts with 100ms between them.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(100),
        }
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted, returning the last error.
///
/// At least one attempt is always made, even with `max_attempts == 0`.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!(
                    operation = label,
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "Attempt failed, retrying"
                );
                attempt += 1;
                sleep(policy.backoff_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Tracks consecutive failures of a polling loop's device.
///
/// The first failure of a streak is logged at `warn!`, the rest at `debug!`, and the
/// first success after a streak at `info!`.
#[derive(Debug)]
pub struct FailureTracker {
    source: &'static str,
    consecutive: u64,
}

impl FailureTracker {
    /// Tracker for the named source.
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            consecutive: 0,
        }
    }

    /// Record a failed iteration.
    pub fn failure(&mut self, error: &dyn std::fmt::Display) {
        self.consecutive += 1;
        if self.consecutive == 1 {
            warn!(source = self.source, error = %error, "Read failed, will retry next tick");
        } else {
            debug!(
                source = self.source,
                consecutive = self.consecutive,
                error = %error,
                "Read still failing"
            );
        }
    }

    /// Record a successful iteration.
    pub fn success(&mut self) {
        if self.consecutive > 0 {
            info!(
                source = self.source,
                failed_ticks = self.consecutive,
                "Read recovered"
            );
            self.consecutive = 0;
        }
    }

    /// Current streak length.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive
    }
}
