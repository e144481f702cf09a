//! Run-wide cooperative cancellation.
//!
//! Every executor holds a clone of the same [`CancelSignal`] and polls it at
//! step boundaries. The first reason recorded wins; later calls to
//! [`CancelSignal::cancel`] are ignored.

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::error::CancelReason;

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reason` and wakes every waiter. Returns `false` if the
    /// signal had already fired.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut guard = self.reason.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_some() {
            return false;
        }
        *guard = Some(reason);
        drop(guard);
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.reason
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Resolves once the signal fires.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
