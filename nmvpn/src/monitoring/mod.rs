//! Real-time monitoring of VPN connection state changes.
//!
//! This module attaches listeners to NetworkManager's per-connection
//! `VpnStateChanged` signal.

pub(crate) mod subscriber;
