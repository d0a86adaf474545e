//! Outcome resolution for a monitored VPN activation.
//!
//! The resolver classifies decoded `VpnStateChanged` notifications and
//! writes the outcome for the first terminal one. Phases move strictly
//! forward to `Resolved`; nothing leaves `Resolved`.

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::Result;
use crate::api::models::{
    ConnectionOutcome, MonitorPhase, StateChange, VpnConnectionReason, VpnConnectionState,
};
use crate::core::completion::CompletionSink;
use crate::core::dispatch::SideEffects;
use crate::types::constants::messages;

/// Builds the message for a `Failed` or `Disconnected` notification.
///
/// A disconnect always reports its own message; the failure templates only
/// apply to `Failed`.
pub(crate) fn failure_message(state: VpnConnectionState, reason: VpnConnectionReason) -> String {
    if state == VpnConnectionState::Disconnected {
        return format!("{}{reason}", messages::DISCONNECTED_PREFIX);
    }

    let cause = match reason {
        VpnConnectionReason::ConnectTimeout => messages::TIMED_OUT,
        VpnConnectionReason::NoSecrets => messages::BAD_CREDENTIALS,
        _ => messages::UNKNOWN_REASON,
    };
    format!("{}{cause}", messages::FAILED_PREFIX)
}

pub(crate) struct OutcomeResolver {
    phase: MonitorPhase,
    sink: CompletionSink,
    effects: SideEffects,
    refresh: Option<JoinHandle<()>>,
}

impl OutcomeResolver {
    pub(crate) fn new(sink: CompletionSink, effects: SideEffects) -> Self {
        Self {
            phase: MonitorPhase::Idle,
            sink,
            effects,
            refresh: None,
        }
    }

    pub(crate) fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.phase == MonitorPhase::Resolved
    }

    pub(crate) fn sink(&self) -> &CompletionSink {
        &self.sink
    }

    /// Takes the background server refresh started on success, if any.
    pub(crate) fn take_refresh(&mut self) -> Option<JoinHandle<()>> {
        self.refresh.take()
    }

    pub(crate) fn begin_search(&mut self) {
        if !self.is_resolved() {
            self.phase = MonitorPhase::Searching;
        }
    }

    pub(crate) fn mark_subscribed(&mut self) {
        if self.phase == MonitorPhase::Searching {
            self.phase = MonitorPhase::Subscribed;
        }
    }

    /// Falls back to `Searching` after the signal stream went away.
    pub(crate) fn mark_unsubscribed(&mut self) {
        if self.phase == MonitorPhase::Subscribed {
            self.phase = MonitorPhase::Searching;
        }
    }

    /// Resolves with the "no VPN found" sentinel.
    pub(crate) fn resolve_not_found(&mut self) {
        warn!("No VPN interface found");
        self.finish(ConnectionOutcome::not_found());
    }

    /// Resolves an activation that never showed up within the retry budget.
    pub(crate) fn resolve_timed_out(&mut self, attempts: u32) {
        let reason = VpnConnectionReason::ConnectTimeout;
        let message = failure_message(VpnConnectionState::Failed, reason);
        error!("No VPN activation observed after {attempts} attempts; {message}");
        self.finish(ConnectionOutcome::new(
            VpnConnectionState::Failed,
            reason,
            message,
        ));
    }

    /// Handles one decoded notification.
    ///
    /// Only the kill switch can fail here; in that case nothing is written
    /// and the error is returned.
    pub(crate) async fn handle(&mut self, change: StateChange) -> Result<()> {
        if self.is_resolved() {
            debug!("Already resolved, ignoring notification: {change}");
            return Ok(());
        }

        info!("State: {} - Reason: {}", change.state, change.reason);

        match change.state {
            VpnConnectionState::Activated => {
                self.effects.apply_kill_switch().await?;

                let message = messages::CONNECTED;
                info!(
                    "State: {} ; Reason: {} ; Message: {message}",
                    change.state, change.reason
                );
                self.finish(ConnectionOutcome::new(change.state, change.reason, message));
                info!("Stopping loop on active VPN connection");

                self.refresh = Some(self.effects.refresh_servers());
            }
            VpnConnectionState::Failed | VpnConnectionState::Disconnected => {
                let message = failure_message(change.state, change.reason);
                error!(
                    "State: {} ; Reason: {} ; Message: {message}",
                    change.state, change.reason
                );
                self.finish(ConnectionOutcome::new(change.state, change.reason, message));
                info!("Stopping loop on failed VPN connection");
            }
            other => {
                debug!("Ignoring non-terminal VPN state: {other}");
            }
        }

        Ok(())
    }

    fn finish(&mut self, outcome: ConnectionOutcome) {
        self.sink.complete(outcome);
        self.phase = MonitorPhase::Resolved;
    }
}
