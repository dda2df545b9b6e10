//! Progress reporting for the record-by-record resolution loop.
//!
//! [`ProgressCallback`] keeps the resolver independent of how progress is
//! rendered. The binary plugs in an `indicatif` bar; tests and library
//! callers that do not care use [`null_progress`].

use std::sync::Arc;

/// Receives progress updates from long-running operations.
///
/// Implementations must be `Send + Sync` so a single handle can be shared
/// through an [`Arc`].
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
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

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
