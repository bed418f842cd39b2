//! Progress reporting for stages that touch every cell.

use std::sync::Arc;

/// Receives progress from a running stage.
///
/// The hazard sampler reports from concurrent request futures, hence
/// `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of units (cells, countries) the stage will process.
    fn set_total(&self, total: u64);

    /// `delta` more units are done.
    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// The stage is done; `msg` summarizes it.
    fn finish(&self, msg: String);

    /// The stage is done and the indicator should disappear.
    fn finish_and_clear(&self);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
