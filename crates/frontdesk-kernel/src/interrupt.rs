//! Cancellation handle shared down the collaborator tree.
//!
//! Every outbound operation started on behalf of a call (reasoning turn,
//! speech sessions, retrievals, synthesis) receives a clone of the call's
//! [`CancelHandle`]. Triggering it is idempotent and wakes every waiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared cancellation flag with async wakeup.
///
/// Cheap to clone; all clones observe the same state.
#[derive(Clone)]
pub struct CancelHandle {
    notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Trigger cancellation and wake all waiters.
    pub fn trigger(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the handle has been triggered.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before the final flag check so a trigger
            // racing with this call cannot be missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
