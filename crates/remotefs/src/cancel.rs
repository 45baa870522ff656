//! Cancellation for search requests.
//!
//! Every request carries a [`CancellationToken`]. Remote calls race their
//! future against the token, so cancelling a request drops its in-flight calls
//! and releases their permits. Caches are never touched by cancellation.
//!
//! [`SearchVersionTracker`] implements "newest search wins": starting a new
//! version cancels the token handed out for the previous one.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
pub use tokio_util::sync::CancellationToken;

/// Tracks the active search version for cancellation.
#[derive(Debug, Default)]
pub struct SearchVersionTracker {
    active_version: AtomicU64,
    active_token: Mutex<Option<CancellationToken>>,
}

impl SearchVersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the active version and returns it with a fresh token.
    ///
    /// The token issued for the previous version is cancelled.
    pub fn next_version(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut active = self.active_token.lock();
        let version = self.active_version.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = active.replace(token.clone()) {
            previous.cancel();
        }
        (version, token)
    }

    /// Returns the current active version without incrementing.
    pub fn current_version(&self) -> u64 {
        self.active_version.load(Ordering::SeqCst)
    }

    /// Cancels the active version, if any.
    pub fn cancel_active(&self) {
        if let Some(token) = self.active_token.lock().take() {
            token.cancel();
        }
    }
}
