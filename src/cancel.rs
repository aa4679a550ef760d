use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag for aborting a clustering run from another thread.
///
/// Clones share the same flag. The merge loop checks it between merges and the chunk runner
/// checks it before each chunk, so a cancelled run stops after at most one more merge per
/// worker and returns [`Error::Cancelled`](crate::Error::Cancelled).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
