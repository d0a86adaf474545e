//! Constants for NetworkManager D-Bus interface values.
//!
//! These constants correspond to the numeric codes used by NetworkManager's
//! D-Bus API for device types, connection states and VPN state reasons.

/// NetworkManager device type constants.
pub mod device_type {
    pub const TUN: u32 = 16;
    pub const WIREGUARD: u32 = 29;
}

/// Connection `Type` values that identify a VPN active connection.
pub mod connection_type {
    pub const VPN: &str = "vpn";
    pub const WIREGUARD: &str = "wireguard";
}

/// Fixed user-facing messages written into a resolved outcome.
pub mod messages {
    pub const NOT_FOUND: &str = "No VPN was found";
    pub const CONNECTED: &str = "Successfully connected to Proton VPN.";
    pub const FAILED_PREFIX: &str = "Proton VPN connection failed due to ";
    pub const TIMED_OUT: &str = "VPN connection time out.";
    pub const BAD_CREDENTIALS: &str = "incorrect openvpn credentials.";
    pub const UNKNOWN_REASON: &str = "unknown reason.";
    pub const DISCONNECTED_PREFIX: &str = "Proton VPN connection has been disconnected. Reason: ";
}

/// Defaults for [`MonitorConfig`](crate::MonitorConfig).
pub mod defaults {
    /// Number of "being prepared" polls before giving up under a bounded retry policy.
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Delay between polls, in milliseconds.
    pub const RETRY_DELAY_MS: u64 = 5000;

    /// Interface name of the virtual VPN device.
    pub const VIRTUAL_DEVICE_NAME: &str = "proton0";

    /// Prefix of the NetworkManager connection id that marks the target VPN.
    pub const CONNECTION_PREFIX: &str = "ProtonVPN";
}
