//! Write-once outcome record and the loop stop signal.
//!
//! The outcome is published before the loop is stopped, so a caller woken by
//! [`MonitorLoop::stopped`] always observes it.

use log::warn;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use crate::api::models::ConnectionOutcome;

/// Handle to the cooperative loop a monitor runs on.
///
/// The caller owns the loop; the monitor only ever stops it. Clones share
/// the same stop state.
#[derive(Debug, Clone, Default)]
pub struct MonitorLoop {
    token: CancellationToken,
}

impl MonitorLoop {
    /// Creates a running loop handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the loop. Idempotent.
    pub fn quit(&self) {
        self.token.cancel();
    }

    /// Whether the loop has not been stopped yet.
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Completes once the loop has been stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}

/// Caller-owned outcome record, written at most once.
#[derive(Debug, Clone, Default)]
pub struct SharedOutcome {
    inner: Arc<OnceLock<ConnectionOutcome>>,
}

impl SharedOutcome {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the outcome once it has been written.
    pub fn get(&self) -> Option<&ConnectionOutcome> {
        self.inner.get()
    }

    /// Whether an outcome has been written.
    pub fn is_resolved(&self) -> bool {
        self.inner.get().is_some()
    }

    fn publish(&self, outcome: ConnectionOutcome) -> bool {
        self.inner.set(outcome).is_ok()
    }
}

/// Pairs the outcome record with the loop it must stop.
#[derive(Debug, Clone)]
pub(crate) struct CompletionSink {
    outcome: SharedOutcome,
    event_loop: MonitorLoop,
}

impl CompletionSink {
    pub(crate) fn new(outcome: SharedOutcome, event_loop: MonitorLoop) -> Self {
        Self {
            outcome,
            event_loop,
        }
    }

    /// Writes `outcome` and stops the loop.
    ///
    /// Returns `false` without touching the record if it was already written.
    pub(crate) fn complete(&self, outcome: ConnectionOutcome) -> bool {
        if !self.outcome.publish(outcome) {
            warn!("Outcome already resolved; ignoring second write");
            return false;
        }
        self.event_loop.quit();
        true
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.outcome.is_resolved()
    }

    pub(crate) fn event_loop(&self) -> &MonitorLoop {
        &self.event_loop
    }
}
