//! NetworkManager-backed implementation of [`NetworkService`].
//!
//! Talks to NetworkManager over the system bus to find the virtual VPN
//! device, locate the target connection among the active ones, and attach
//! to its `VpnStateChanged` signal.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use zbus::Connection;
use zbus::proxy::CacheProperties;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::models::{
    ActiveConnectionState, ConnectionHandle, ConnectionProperties, MonitorConfig, MonitorError,
    PreparationStatus, VpnConnectionState, VpnInterface,
};
use crate::api::traits::{NetworkService, RawStateStream};
use crate::dbus::{NMActiveConnectionProxy, NMDeviceProxy, NMProxy, NMVpnConnectionProxy};
use crate::try_log;
use crate::util::utils::{is_stale_object_error, is_target_id, is_vpn_connection, is_vpn_device_type};

/// [`NetworkService`] over NetworkManager's D-Bus API.
///
/// `NmClient` is `Clone`; clones share the same D-Bus connection.
#[derive(Debug, Clone)]
pub struct NmClient {
    conn: Connection,
    virtual_device_name: String,
    connection_prefix: String,
}

impl NmClient {
    /// Creates a client on an existing D-Bus connection.
    pub fn new(conn: Connection, config: &MonitorConfig) -> Self {
        Self {
            conn,
            virtual_device_name: config.virtual_device_name.clone(),
            connection_prefix: config.connection_prefix.clone(),
        }
    }

    /// Creates a client connected to the system D-Bus.
    pub async fn system(config: &MonitorConfig) -> Result<Self> {
        let conn = Connection::system().await?;
        Ok(Self::new(conn, config))
    }

    async fn vpn_device(&self, path: OwnedObjectPath) -> Option<VpnInterface> {
        let builder = try_log!(
            NMDeviceProxy::builder(&self.conn).path(path.clone()),
            "Failed to create device proxy builder"
        );
        let dev = try_log!(builder.build().await, "Failed to build device proxy");

        let device_type = try_log!(dev.device_type().await, "Failed to get device type");
        if !is_vpn_device_type(device_type) {
            return None;
        }

        let interface = try_log!(dev.interface().await, "Failed to get interface name");
        if interface != self.virtual_device_name {
            return None;
        }

        Some(VpnInterface {
            path,
            interface,
            device_type,
        })
    }

    async fn read_properties(&self, path: &OwnedObjectPath) -> zbus::Result<ConnectionProperties> {
        let ac = NMActiveConnectionProxy::builder(&self.conn)
            .path(path.clone())?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        Ok(ConnectionProperties {
            id: ac.id().await?,
            uuid: ac.uuid().await?,
            connection_type: ac.connection_type().await?,
            vpn: ac.vpn().await?,
            state: ActiveConnectionState::from(ac.state().await?),
        })
    }
}

#[async_trait]
impl NetworkService for NmClient {
    async fn find_vpn_interface(&self) -> Result<Option<VpnInterface>> {
        let nm = NMProxy::new(&self.conn).await?;

        for path in nm.get_devices().await? {
            if let Some(iface) = self.vpn_device(path).await {
                debug!("Found VPN interface {} at {}", iface.interface, iface.path);
                return Ok(Some(iface));
            }
        }

        Ok(None)
    }

    async fn target_vpn_being_prepared(&self) -> Result<PreparationStatus> {
        let nm = NMProxy::new(&self.conn).await?;

        for path in nm.active_connections().await? {
            let props = match self.read_properties(&path).await {
                Ok(props) => props,
                Err(e) => {
                    warn!("Failed to read active connection {path}: {e}");
                    continue;
                }
            };

            if !is_vpn_connection(props.vpn, &props.connection_type)
                || !is_target_id(&props.id, &self.connection_prefix)
            {
                continue;
            }

            debug!(
                "Target VPN {} at {path} is {}",
                props.id, props.state
            );
            return Ok(PreparationStatus {
                is_target: true,
                activation_state: props.state,
                handle: Some(ConnectionHandle::from(path)),
            });
        }

        Ok(PreparationStatus::absent())
    }

    async fn active_connection_properties(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<ConnectionProperties> {
        self.read_properties(handle.path()).await.map_err(|e| {
            if is_stale_object_error(&e) {
                debug!("Lookup of {handle} failed: {e}");
                MonitorError::NotActiveConnection(handle.to_string())
            } else {
                MonitorError::Dbus(e)
            }
        })
    }

    async fn subscribe_state_changes(&self, handle: &ConnectionHandle) -> Result<RawStateStream> {
        let subscription_error = |e: zbus::Error| {
            if is_stale_object_error(&e) {
                MonitorError::Subscription(format!("{handle}: {e}"))
            } else {
                MonitorError::Dbus(e)
            }
        };

        let vpn = NMVpnConnectionProxy::builder(&self.conn)
            .path(handle.path().clone())?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .map_err(subscription_error)?;

        let stream = vpn
            .receive_vpn_state_changed()
            .await
            .map_err(subscription_error)?;

        match vpn.current_vpn_state().await {
            Ok(code) => debug!(
                "VPN state of {handle} at subscription: {}",
                VpnConnectionState::from(code)
            ),
            Err(e) => return Err(subscription_error(e)),
        }

        Ok(stream
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some((args.state, args.reason)),
                    Err(e) => {
                        warn!("Failed to parse VpnStateChanged signal args: {e}");
                        None
                    }
                }
            })
            .boxed())
    }
}
