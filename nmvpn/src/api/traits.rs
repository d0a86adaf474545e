//! Collaborator interfaces injected into the monitor.
//!
//! The monitor never reaches for process-wide state. NetworkManager access,
//! the kill switch and the API session are all handed in at construction,
//! which lets tests drive the monitor with in-memory fakes.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;
use crate::api::models::{
    ConnectionHandle, ConnectionProperties, KillSwitchAction, KillSwitchSetting, PreparationStatus,
    VpnInterface,
};

/// Raw `(state, reason)` codes as carried by a `VpnStateChanged` signal.
pub type RawStateStream = BoxStream<'static, (u32, u32)>;

/// The subset of the network-management service the monitor consumes.
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Returns the VPN-capable network interface, if one exists.
    async fn find_vpn_interface(&self) -> Result<Option<VpnInterface>>;

    /// Reports whether the target VPN connection is currently being prepared.
    async fn target_vpn_being_prepared(&self) -> Result<PreparationStatus>;

    /// Reads the properties of an active connection.
    ///
    /// Fails with [`MonitorError::NotActiveConnection`](crate::MonitorError::NotActiveConnection)
    /// when the handle no longer refers to an active connection.
    async fn active_connection_properties(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<ConnectionProperties>;

    /// Attaches a listener for VPN state changes on `handle`.
    ///
    /// Fails with [`MonitorError::Subscription`](crate::MonitorError::Subscription)
    /// under the same staleness condition.
    async fn subscribe_state_changes(&self, handle: &ConnectionHandle) -> Result<RawStateStream>;
}

/// The kill switch policy engine.
#[async_trait]
pub trait KillSwitch: Send + Sync {
    /// Current process-wide kill switch setting.
    fn setting(&self) -> KillSwitchSetting;

    /// Applies a kill switch transition.
    async fn manage(&self, action: KillSwitchAction) -> Result<()>;
}

/// The API session used to refresh server metadata.
#[async_trait]
pub trait ServerSession: Send + Sync {
    /// Refreshes the cached server list when it is stale.
    async fn update_servers_if_needed(&self) -> Result<()>;
}
