//! Progress hooks for a pipeline run.
//!
//! The pipeline reports one tick per finished trip through
//! [`ProgressCallback`]; how that is rendered (terminal bar, log lines,
//! nothing) is up to the caller.

use std::sync::Arc;

/// Receives progress updates from a running pipeline.
///
/// Shared across tasks, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of trips that will be reported.
    fn set_total(&self, total: u64);

    /// Advances by `delta` finished trips.
    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Called once when the run ends.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
