//! NetworkManager VPN Connection proxy.

use zbus::{Result, proxy};

/// Proxy for the VPN-specific interface of an active VPN connection.
///
/// Lives on the same object path as the active connection.
///
/// # Signals
///
/// `VpnStateChanged` is emitted on every VPN state transition. Use
/// `receive_vpn_state_changed()` to get a stream of them:
///
/// ```ignore
/// let mut stream = vpn_proxy.receive_vpn_state_changed().await?;
/// while let Some(signal) = stream.next().await {
///     let args = signal.args()?;
///     match args.state {
///         5 => println!("VPN active"),
///         6 => println!("VPN failed: reason {}", args.reason),
///         _ => {}
///     }
/// }
/// ```
#[proxy(
    interface = "org.freedesktop.NetworkManager.VPN.Connection",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMVpnConnection {
    /// Current VPN state (see `VpnConnectionState`).
    ///
    /// The accessor name keeps the generated `receive_*_changed` property
    /// stream from colliding with the `VpnStateChanged` signal stream.
    #[zbus(property, name = "VpnState")]
    fn current_vpn_state(&self) -> Result<u32>;

    /// Signal emitted when the VPN connection state changes.
    ///
    /// Arguments:
    /// - `state`: The new VPN state (see `VpnConnectionState`)
    /// - `reason`: The reason for the change (see `VpnConnectionReason`)
    #[zbus(signal)]
    fn vpn_state_changed(&self, state: u32, reason: u32);
}
