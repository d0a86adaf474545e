use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use zvariant::{OwnedObjectPath, Type};

use crate::types::constants::{defaults, messages};

/// NetworkManager active connection state.
///
/// These values represent the lifecycle states of an active connection
/// as reported by the NM D-Bus API. The monitor only cares whether the
/// target connection is still `Activating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveConnectionState {
    /// Connection state is unknown.
    Unknown,
    /// Connection is activating (connecting).
    Activating,
    /// Connection is fully activated (connected).
    Activated,
    /// Connection is deactivating (disconnecting).
    Deactivating,
    /// Connection is fully deactivated (disconnected).
    Deactivated,
    /// Unknown state code not mapped to a specific variant.
    Other(u32),
}

impl From<u32> for ActiveConnectionState {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Activating,
            2 => Self::Activated,
            3 => Self::Deactivating,
            4 => Self::Deactivated,
            v => Self::Other(v),
        }
    }
}

impl Display for ActiveConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Deactivating => write!(f, "deactivating"),
            Self::Deactivated => write!(f, "deactivated"),
            Self::Other(v) => write!(f, "unknown state ({v})"),
        }
    }
}

/// NetworkManager VPN connection state.
///
/// Decoded from the `state` argument of the `VpnStateChanged` signal.
/// `NotFound` is not emitted by NetworkManager; it is the sentinel written
/// when no VPN device exists at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
pub enum VpnConnectionState {
    /// The state of the VPN connection is unknown.
    Unknown,
    /// The VPN connection is preparing to connect.
    Prepare,
    /// The VPN connection needs authorization credentials.
    NeedAuth,
    /// The VPN connection is being established.
    Connect,
    /// The VPN connection is getting an IP address.
    IpConfigGet,
    /// The VPN connection is active.
    Activated,
    /// The VPN connection failed.
    Failed,
    /// The VPN connection is disconnected.
    Disconnected,
    /// No VPN device was found.
    NotFound,
    /// Unknown state code not mapped to a specific variant.
    Other(u32),
}

impl VpnConnectionState {
    /// Returns the raw NetworkManager code for this state.
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Prepare => 1,
            Self::NeedAuth => 2,
            Self::Connect => 3,
            Self::IpConfigGet => 4,
            Self::Activated => 5,
            Self::Failed => 6,
            Self::Disconnected => 7,
            Self::NotFound => 999,
            Self::Other(v) => v,
        }
    }

    /// Whether a notification in this state ends the monitor's responsibility.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Activated | Self::Failed | Self::Disconnected)
    }
}

impl From<u32> for VpnConnectionState {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Prepare,
            2 => Self::NeedAuth,
            3 => Self::Connect,
            4 => Self::IpConfigGet,
            5 => Self::Activated,
            6 => Self::Failed,
            7 => Self::Disconnected,
            999 => Self::NotFound,
            v => Self::Other(v),
        }
    }
}

impl From<VpnConnectionState> for u32 {
    fn from(state: VpnConnectionState) -> Self {
        state.code()
    }
}

impl Display for VpnConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Prepare => write!(f, "preparing"),
            Self::NeedAuth => write!(f, "needs authentication"),
            Self::Connect => write!(f, "connecting"),
            Self::IpConfigGet => write!(f, "getting IP configuration"),
            Self::Activated => write!(f, "activated"),
            Self::Failed => write!(f, "failed"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::NotFound => write!(f, "not found"),
            Self::Other(v) => write!(f, "unknown state ({v})"),
        }
    }
}

/// NetworkManager VPN connection state reason codes.
///
/// These values indicate why a VPN connection transitioned to its current
/// state. Use `VpnConnectionReason::from(code)` to convert from the raw u32
/// values carried by `VpnStateChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
pub enum VpnConnectionReason {
    /// The reason is unknown.
    Unknown,
    /// No specific reason.
    None,
    /// User disconnected.
    UserDisconnected,
    /// The base network connection was interrupted.
    DeviceDisconnected,
    /// The VPN service stopped unexpectedly.
    ServiceStopped,
    /// The VPN service returned invalid IP configuration.
    IpConfigInvalid,
    /// The connection attempt to the VPN service timed out.
    ConnectTimeout,
    /// The VPN service did not start in time.
    ServiceStartTimeout,
    /// The VPN service failed to start.
    ServiceStartFailed,
    /// No valid secrets were available.
    NoSecrets,
    /// Invalid secrets (login failed).
    LoginFailed,
    /// The connection was deleted from settings.
    ConnectionRemoved,
    /// Master connection failed to activate.
    DependencyFailed,
    /// Could not create the software device link.
    DeviceRealizeFailed,
    /// The device this connection depended on disappeared.
    DeviceRemoved,
    /// No VPN device was found.
    NotFound,
    /// Unknown reason code not mapped to a specific variant.
    Other(u32),
}

impl VpnConnectionReason {
    /// Returns the raw NetworkManager code for this reason.
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::None => 1,
            Self::UserDisconnected => 2,
            Self::DeviceDisconnected => 3,
            Self::ServiceStopped => 4,
            Self::IpConfigInvalid => 5,
            Self::ConnectTimeout => 6,
            Self::ServiceStartTimeout => 7,
            Self::ServiceStartFailed => 8,
            Self::NoSecrets => 9,
            Self::LoginFailed => 10,
            Self::ConnectionRemoved => 11,
            Self::DependencyFailed => 12,
            Self::DeviceRealizeFailed => 13,
            Self::DeviceRemoved => 14,
            Self::NotFound => 999,
            Self::Other(v) => v,
        }
    }
}

impl From<u32> for VpnConnectionReason {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::None,
            2 => Self::UserDisconnected,
            3 => Self::DeviceDisconnected,
            4 => Self::ServiceStopped,
            5 => Self::IpConfigInvalid,
            6 => Self::ConnectTimeout,
            7 => Self::ServiceStartTimeout,
            8 => Self::ServiceStartFailed,
            9 => Self::NoSecrets,
            10 => Self::LoginFailed,
            11 => Self::ConnectionRemoved,
            12 => Self::DependencyFailed,
            13 => Self::DeviceRealizeFailed,
            14 => Self::DeviceRemoved,
            999 => Self::NotFound,
            v => Self::Other(v),
        }
    }
}

impl From<VpnConnectionReason> for u32 {
    fn from(reason: VpnConnectionReason) -> Self {
        reason.code()
    }
}

impl Display for VpnConnectionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::None => write!(f, "none"),
            Self::UserDisconnected => write!(f, "user disconnected"),
            Self::DeviceDisconnected => write!(f, "device disconnected"),
            Self::ServiceStopped => write!(f, "service stopped"),
            Self::IpConfigInvalid => write!(f, "IP configuration invalid"),
            Self::ConnectTimeout => write!(f, "connection timed out"),
            Self::ServiceStartTimeout => write!(f, "service start timed out"),
            Self::ServiceStartFailed => write!(f, "service start failed"),
            Self::NoSecrets => write!(f, "no secrets (password) provided"),
            Self::LoginFailed => write!(f, "login/authentication failed"),
            Self::ConnectionRemoved => write!(f, "connection was removed"),
            Self::DependencyFailed => write!(f, "dependency failed"),
            Self::DeviceRealizeFailed => write!(f, "device realization failed"),
            Self::DeviceRemoved => write!(f, "device was removed"),
            Self::NotFound => write!(f, "not found"),
            Self::Other(v) => write!(f, "unknown reason ({v})"),
        }
    }
}

/// A decoded `VpnStateChanged` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// New VPN connection state.
    pub state: VpnConnectionState,
    /// Reason for the transition.
    pub reason: VpnConnectionReason,
}

impl StateChange {
    /// Decodes a raw `(state, reason)` pair as carried by the D-Bus signal.
    pub fn from_raw(state: u32, reason: u32) -> Self {
        Self {
            state: VpnConnectionState::from(state),
            reason: VpnConnectionReason::from(reason),
        }
    }
}

impl Display for StateChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (reason: {})", self.state, self.reason)
    }
}

/// The resolved result of a VPN activation.
///
/// Written exactly once by the monitor and read by the caller after the
/// monitor loop has stopped. Both enums serialize as their integer codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOutcome {
    /// Final VPN connection state.
    pub state: VpnConnectionState,
    /// Human-readable description of the outcome.
    pub message: String,
    /// Reason reported alongside the final state.
    pub reason: VpnConnectionReason,
}

impl ConnectionOutcome {
    /// Creates an outcome from its three fields.
    pub fn new(
        state: VpnConnectionState,
        reason: VpnConnectionReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            state,
            message: message.into(),
            reason,
        }
    }

    /// The sentinel outcome written when no VPN device exists.
    pub fn not_found() -> Self {
        Self::new(
            VpnConnectionState::NotFound,
            VpnConnectionReason::NotFound,
            messages::NOT_FOUND,
        )
    }

    /// Whether this outcome reports an active connection.
    pub fn is_success(&self) -> bool {
        self.state == VpnConnectionState::Activated
    }

    /// Encodes the outcome as the response relayed to the requester.
    pub fn to_response(&self) -> OutcomeResponse {
        OutcomeResponse::from(self)
    }
}

impl Display for ConnectionOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.state, self.reason, self.message)
    }
}

/// Wire form of a [`ConnectionOutcome`], D-Bus signature `(usu)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct OutcomeResponse {
    /// Raw state code.
    pub state: u32,
    /// Human-readable message.
    pub message: String,
    /// Raw reason code.
    pub reason: u32,
}

impl From<&ConnectionOutcome> for OutcomeResponse {
    fn from(outcome: &ConnectionOutcome) -> Self {
        Self {
            state: outcome.state.code(),
            message: outcome.message.clone(),
            reason: outcome.reason.code(),
        }
    }
}

/// Process-wide kill switch setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KillSwitchSetting {
    /// Kill switch disabled.
    #[default]
    Off,
    /// Blocks non-VPN traffic only while a VPN connection is up.
    Soft,
    /// Blocks all non-VPN traffic permanently.
    Hard,
}

/// Transition requested from the kill switch once a connection is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSwitchAction {
    /// Re-apply the hard kill switch rules for the new VPN interface.
    PostConnection,
    /// Enable the soft kill switch.
    Soft,
}

impl Display for KillSwitchAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PostConnection => write!(f, "post-connection"),
            Self::Soft => write!(f, "soft"),
        }
    }
}

/// Opaque reference to an active connection object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle(OwnedObjectPath);

impl ConnectionHandle {
    /// Returns the D-Bus object path.
    pub fn path(&self) -> &OwnedObjectPath {
        &self.0
    }

    /// Returns the D-Bus object path as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<OwnedObjectPath> for ConnectionHandle {
    fn from(path: OwnedObjectPath) -> Self {
        Self(path)
    }
}

impl TryFrom<&str> for ConnectionHandle {
    type Error = MonitorError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Ok(Self(OwnedObjectPath::try_from(path)?))
    }
}

impl Display for ConnectionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

/// A VPN-capable network interface known to NetworkManager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnInterface {
    /// Device object path.
    pub path: OwnedObjectPath,
    /// Kernel interface name (e.g. `proton0`).
    pub interface: String,
    /// NetworkManager device type code.
    pub device_type: u32,
}

/// Result of asking whether the target VPN connection is being prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparationStatus {
    /// Whether an active connection matching the target was found.
    pub is_target: bool,
    /// Activation state of that connection.
    pub activation_state: ActiveConnectionState,
    /// The connection to subscribe to, when one was found.
    pub handle: Option<ConnectionHandle>,
}

impl PreparationStatus {
    /// No matching connection.
    pub fn absent() -> Self {
        Self {
            is_target: false,
            activation_state: ActiveConnectionState::Unknown,
            handle: None,
        }
    }

    /// Returns the handle when the target connection is currently activating.
    pub fn activating_handle(&self) -> Option<&ConnectionHandle> {
        if self.is_target && self.activation_state == ActiveConnectionState::Activating {
            self.handle.as_ref()
        } else {
            None
        }
    }
}

/// Properties of an active connection, read for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProperties {
    /// Connection identifier.
    pub id: String,
    /// Connection UUID.
    pub uuid: String,
    /// Connection type (e.g. `vpn`, `wireguard`).
    pub connection_type: String,
    /// Whether NetworkManager flags this as a VPN connection.
    pub vpn: bool,
    /// Current activation state.
    pub state: ActiveConnectionState,
}

/// Lifecycle phase of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    /// Constructed, no device check done.
    Idle,
    /// Checking for a VPN device and an in-progress activation.
    Searching,
    /// Listener attached, awaiting a terminal notification.
    Subscribed,
    /// Outcome written and loop stopped.
    Resolved,
}

impl Display for MonitorPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Searching => write!(f, "searching"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// What the monitor does when no activating target connection is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Wait without re-polling. The caller must bound the loop with its own deadline.
    #[default]
    Disabled,
    /// Re-poll every `retry_delay_ms` up to `max_attempts` times, then resolve
    /// the activation as timed out.
    Bounded,
}

/// Monitor configuration.
///
/// # Examples
///
/// ```rust
/// use nmvpn::{MonitorConfig, RetryPolicy};
///
/// let config = MonitorConfig::default()
///     .with_retry(RetryPolicy::Bounded)
///     .with_max_attempts(3)
///     .with_retry_delay_ms(1000);
///
/// assert_eq!(config.retry_delay().as_millis(), 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Total number of "being prepared" checks under [`RetryPolicy::Bounded`].
    pub max_attempts: u32,
    /// Delay between checks, in milliseconds.
    pub retry_delay_ms: u64,
    /// Retry behaviour when no activation is observed.
    pub retry: RetryPolicy,
    /// Interface name of the virtual VPN device.
    pub virtual_device_name: String,
    /// Prefix of the connection id identifying the target VPN.
    pub connection_prefix: String,
}

impl Default for MonitorConfig {
    /// Defaults:
    /// - `max_attempts`: 5
    /// - `retry_delay_ms`: 5000
    /// - `retry`: [`RetryPolicy::Disabled`]
    /// - `virtual_device_name`: `proton0`
    /// - `connection_prefix`: `ProtonVPN`
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            retry: RetryPolicy::default(),
            virtual_device_name: defaults::VIRTUAL_DEVICE_NAME.into(),
            connection_prefix: defaults::CONNECTION_PREFIX.into(),
        }
    }
}

impl MonitorConfig {
    /// Sets the maximum number of checks.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the delay between checks in milliseconds.
    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the virtual device name.
    pub fn with_virtual_device_name(mut self, name: impl Into<String>) -> Self {
        self.virtual_device_name = name.into();
        self
    }

    /// Sets the connection id prefix.
    pub fn with_connection_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.connection_prefix = prefix.into();
        self
    }

    /// Delay between checks.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Rejects configurations the monitor cannot operate with.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.max_attempts == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_attempts must be > 0".into(),
            ));
        }
        if self.virtual_device_name.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "virtual_device_name cannot be empty".into(),
            ));
        }
        if self.connection_prefix.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "connection_prefix cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur while monitoring a VPN activation.
///
/// Outcomes of the activation itself (failed, disconnected, not found) are
/// never errors; they are written into the [`ConnectionOutcome`].
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A D-Bus value could not be built or decoded.
    #[error("D-Bus value error: {0}")]
    Variant(#[from] zvariant::Error),

    /// The handle no longer refers to an active connection.
    #[error("{0} is not an active connection")]
    NotActiveConnection(String),

    /// Attaching the state listener failed.
    #[error("failed to subscribe to state changes: {0}")]
    Subscription(String),

    /// The kill switch rejected the requested transition.
    #[error("kill switch transition failed: {0}")]
    KillSwitch(String),

    /// The API session could not complete a request.
    #[error("session error: {0}")]
    Session(String),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller's deadline elapsed before a terminal notification arrived.
    #[error("timed out waiting for VPN activation")]
    Timeout,
}
