//! Side effects run once a VPN connection becomes active.

use log::{debug, info};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::Result;
use crate::api::models::{KillSwitchAction, KillSwitchSetting};
use crate::api::traits::{KillSwitch, ServerSession};

/// Maps the kill switch setting to the transition requested after connecting.
pub(crate) fn kill_switch_action(setting: KillSwitchSetting) -> Option<KillSwitchAction> {
    match setting {
        KillSwitchSetting::Hard => Some(KillSwitchAction::PostConnection),
        KillSwitchSetting::Soft => Some(KillSwitchAction::Soft),
        KillSwitchSetting::Off => None,
    }
}

/// Collaborators invoked on a successful connection.
#[derive(Clone)]
pub struct SideEffects {
    kill_switch: Arc<dyn KillSwitch>,
    session: Arc<dyn ServerSession>,
}

impl SideEffects {
    /// Bundles the kill switch and the API session.
    pub fn new(kill_switch: Arc<dyn KillSwitch>, session: Arc<dyn ServerSession>) -> Self {
        Self {
            kill_switch,
            session,
        }
    }

    /// Requests the kill switch transition matching the current setting.
    ///
    /// Errors from the kill switch are returned to the caller untouched.
    pub(crate) async fn apply_kill_switch(&self) -> Result<()> {
        let setting = self.kill_switch.setting();
        match kill_switch_action(setting) {
            Some(action) => {
                info!("Applying kill switch transition: {action}");
                self.kill_switch.manage(action).await
            }
            None => {
                debug!("Kill switch is off, nothing to apply");
                Ok(())
            }
        }
    }

    /// Refreshes server metadata on a background task. Failures are discarded.
    pub(crate) fn refresh_servers(&self) -> JoinHandle<()> {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Err(e) = session.update_servers_if_needed().await {
                debug!("Skipping server refresh: {e}");
            }
        })
    }
}

impl std::fmt::Debug for SideEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffects")
            .field("kill_switch", &self.kill_switch.setting())
            .finish_non_exhaustive()
    }
}
