//! Cancellation token for cooperative run cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A token the orchestrator checks before each wave and each sequential apply.
///
/// In-flight applies are never interrupted. Only the first reason is kept.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason. Later calls are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.reason.write();
        if slot.is_none() {
            *slot = Some(reason.into());
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}
