//! NetworkManager Active Connection proxy.

use zbus::{Result, proxy};

/// Proxy for active connection interface.
///
/// Provides access to the identity and activation state of an active
/// (in-progress or established) connection. The monitor uses it to decide
/// whether the target VPN is being prepared, and to log which connection it
/// attaches to.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMActiveConnection {
    /// Current state of the active connection.
    ///
    /// Values:
    /// - 0: Unknown
    /// - 1: Activating
    /// - 2: Activated
    /// - 3: Deactivating
    /// - 4: Deactivated
    #[zbus(property)]
    fn state(&self) -> Result<u32>;

    /// Connection identifier (the profile name).
    #[zbus(property)]
    fn id(&self) -> Result<String>;

    /// Connection UUID.
    #[zbus(property)]
    fn uuid(&self) -> Result<String>;

    /// Connection type (`vpn`, `wireguard`, ...).
    #[zbus(property, name = "Type")]
    fn connection_type(&self) -> Result<String>;

    /// Whether this active connection is a VPN connection.
    #[zbus(property)]
    fn vpn(&self) -> Result<bool>;
}
