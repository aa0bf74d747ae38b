//! Staged cluster launch state.
//!
//! The external supervisor starts clusters one at a time. A cluster that
//! has finished connecting signals readiness (see `Ipc::signal_ready`) so
//! the supervisor can start the next one; once every cluster is up the
//! supervisor broadcasts `bot/all_clusters_launched` and the dispatcher
//! flips the flag held here.

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared launch-sequence state: a single boolean.
#[derive(Debug, Default)]
pub struct LaunchState {
    all_launched: AtomicBool,
}

impl LaunchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the supervisor has reported the whole fleet as launched.
    pub fn all_clusters_launched(&self) -> bool {
        self.all_launched.load(Ordering::Acquire)
    }

    pub(crate) fn mark_all_launched(&self) {
        self.all_launched.store(true, Ordering::Release);
    }
}
