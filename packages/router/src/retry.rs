//! Fixed-schedule retry loop for routing requests.
//!
//! Every attempt is preceded by the delay at its position in the
//! schedule, so `[0, 1, 2, 4, 8]` means five attempts with 15 seconds of
//! total backoff. The caller classifies each attempt:
//!
//! - [`Attempt::Done`] ends the loop with a value.
//! - [`Attempt::Retry`] records the error and moves to the next slot.
//! - [`Attempt::Fail`] ends the loop immediately.
//!
//! When the schedule runs out, the last recorded error is returned. The
//! wait happens inside the caller's task, so a trip in backoff keeps its
//! concurrency slot.

use std::future::Future;
use std::time::Duration;

use crate::RouteError;

/// Backoff schedule used when none is configured.
pub const DEFAULT_BACKOFF_SECS: [u64; 5] = [0, 1, 2, 4, 8];

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    Retry(RouteError),
    Fail(RouteError),
}

/// Ordered delays preceding each attempt. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// # Errors
    ///
    /// Returns [`RouteError::Config`] if `delays` is empty.
    pub fn new(delays: Vec<Duration>) -> Result<Self, RouteError> {
        if delays.is_empty() {
            return Err(RouteError::Config {
                message: "backoff schedule must contain at least one attempt".to_string(),
            });
        }
        Ok(Self { delays })
    }

    /// # Errors
    ///
    /// Returns [`RouteError::Config`] if `secs` is empty.
    pub fn from_secs(secs: &[u64]) -> Result<Self, RouteError> {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: DEFAULT_BACKOFF_SECS
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}

/// Runs `attempt` according to `schedule`.
///
/// `attempt` receives the zero-based attempt number.
///
/// # Errors
///
/// Returns the [`Attempt::Fail`] error, or the last [`Attempt::Retry`]
/// error once every slot in the schedule has been used.
pub async fn run<T, F, Fut>(schedule: &BackoffSchedule, mut attempt: F) -> Result<T, RouteError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let total = schedule.attempts();
    let mut last_error: Option<RouteError> = None;

    for (n, delay) in schedule.delays().iter().enumerate() {
        if !delay.is_zero() {
            if let Some(e) = &last_error {
                log::warn!("  retry {n}/{} in {delay:?} after: {e}", total - 1);
            }
            tokio::time::sleep(*delay).await;
        }

        match attempt(n).await {
            Attempt::Done(value) => {
                if n > 0 {
                    log::debug!("  succeeded on attempt {}/{total}", n + 1);
                }
                return Ok(value);
            }
            Attempt::Fail(e) => return Err(e),
            Attempt::Retry(e) => {
                log::debug!("  attempt {}/{total} failed: {e}", n + 1);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| RouteError::Config {
        message: "backoff schedule produced no attempts".to_string(),
    }))
}
