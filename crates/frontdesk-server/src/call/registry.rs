//! Registry of active calls.
//!
//! Each entry holds the caller number announced by the inbound webhook
//! and the call-scoped cancellation handle. The session task owns the
//! call's state; the registry only lets webhooks find and cancel it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use frontdesk_kernel::interrupt::CancelHandle;

#[derive(Clone)]
pub struct ActiveCall {
    pub caller_number: String,
    pub cancel: CancelHandle,
    pub started_at: DateTime<Utc>,
}

/// Active-call map shared across the server.
#[derive(Clone, Default)]
pub struct CallRegistry {
    inner: Arc<RwLock<HashMap<String, ActiveCall>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call, returning its cancellation handle. Registering an
    /// already-known call id returns the existing handle so the webhook
    /// and the media stream share one.
    pub async fn register(&self, call_sid: &str, caller_number: &str) -> CancelHandle {
        let mut inner = self.inner.write().await;
        inner
            .entry(call_sid.to_string())
            .or_insert_with(|| ActiveCall {
                caller_number: caller_number.to_string(),
                cancel: CancelHandle::new(),
                started_at: Utc::now(),
            })
            .cancel
            .clone()
    }

    pub async fn get(&self, call_sid: &str) -> Option<ActiveCall> {
        self.inner.read().await.get(call_sid).cloned()
    }

    pub async fn remove(&self, call_sid: &str) -> Option<ActiveCall> {
        self.inner.write().await.remove(call_sid)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
