//! Helpers shared by the NetworkManager client.

use crate::types::constants::{connection_type, device_type};

/// Macro to convert Result to Option with error logging.
/// Usage: `try_log!(result, "context message")`
#[macro_export]
macro_rules! try_log {
    ($result:expr, $context:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}: {:?}", $context, e);
                return None;
            }
        }
    };
}

/// Whether a D-Bus error means the remote object is gone.
///
/// NetworkManager answers calls on a removed active connection with a
/// method error (`UnknownObject`, `UnknownMethod`, ...) rather than a
/// transport failure.
pub(crate) fn is_stale_object_error(err: &zbus::Error) -> bool {
    matches!(
        err,
        zbus::Error::MethodError(..) | zbus::Error::FDO(_) | zbus::Error::InterfaceNotFound
    )
}

/// Whether a device type can carry the virtual VPN interface.
pub(crate) fn is_vpn_device_type(code: u32) -> bool {
    matches!(code, device_type::TUN | device_type::WIREGUARD)
}

/// Whether an active connection is a VPN, by its `Vpn` flag or `Type`.
pub(crate) fn is_vpn_connection(vpn_flag: bool, conn_type: &str) -> bool {
    vpn_flag || conn_type == connection_type::VPN || conn_type == connection_type::WIREGUARD
}

/// Whether a connection id names the target VPN.
pub(crate) fn is_target_id(id: &str, prefix: &str) -> bool {
    !prefix.is_empty() && id.starts_with(prefix)
}
