//! A Rust library for monitoring VPN activations in NetworkManager.
//!
//! After a VPN activation has been requested from NetworkManager, this crate
//! watches the activation and resolves it exactly once:
//!
//! - success, when the VPN connection becomes active
//! - failure with a reason, when it fails or disconnects
//! - "no VPN found", when no VPN device exists at all
//!
//! On success it applies the kill switch transition for the current setting
//! and refreshes server metadata on a best-effort basis.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nmvpn::{MonitorConfig, MonitorLoop, SharedOutcome, SideEffects, VpnConnectionMonitor};
//!
//! # async fn example(effects: SideEffects) -> nmvpn::Result<()> {
//! let event_loop = MonitorLoop::new();
//! let outcome = SharedOutcome::new();
//!
//! let mut monitor =
//!     VpnConnectionMonitor::system(effects, MonitorConfig::default(), &event_loop, outcome.clone())
//!         .await?;
//! monitor.run_for(Duration::from_secs(60)).await?;
//!
//! let result = outcome.get().expect("loop stopped with an outcome");
//! println!("{} ({})", result.message, result.state);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! The fate of the activation is never an error: it is written into the
//! [`ConnectionOutcome`]. `MonitorError` covers D-Bus failures, invalid
//! configuration, kill switch failures and caller deadlines.
//!
//! # Signal-Based State Monitoring
//!
//! The monitor subscribes to the `VpnStateChanged` signal of the one
//! connection being activated, instead of polling. A connection that
//! disappears between discovery and subscription is tolerated; whether the
//! monitor then re-polls is controlled by [`RetryPolicy`].
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`. For example:

//! ```no_run,ignore
//! env_logger::init();
//! // ...
//! ```

// Internal implementation modules
mod core;
mod dbus;
mod monitoring;
mod types;
mod util;

// Public API modules
pub mod api;

// Re-exported public API
pub use api::models::{
    ActiveConnectionState, ConnectionHandle, ConnectionOutcome, ConnectionProperties,
    KillSwitchAction, KillSwitchSetting, MonitorConfig, MonitorError, MonitorPhase,
    OutcomeResponse, PreparationStatus, RetryPolicy, StateChange, VpnConnectionReason,
    VpnConnectionState, VpnInterface,
};
pub use api::monitor::VpnConnectionMonitor;
pub use api::traits::{KillSwitch, NetworkService, RawStateStream, ServerSession};
pub use crate::core::completion::{MonitorLoop, SharedOutcome};
pub use crate::core::dispatch::SideEffects;
pub use crate::core::nm_client::NmClient;

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
