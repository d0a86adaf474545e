//! Tests for the activation monitor.
//!
//! NetworkManager, the kill switch and the API session are replaced with
//! in-memory fakes; notifications are pushed through a channel standing in
//! for the `VpnStateChanged` signal.

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zvariant::OwnedObjectPath;

use nmvpn::{
    ActiveConnectionState, ConnectionHandle, ConnectionOutcome, ConnectionProperties, KillSwitch,
    KillSwitchAction, KillSwitchSetting, MonitorConfig, MonitorError, MonitorLoop, MonitorPhase,
    NetworkService, PreparationStatus, RawStateStream, RetryPolicy, ServerSession, SharedOutcome,
    SideEffects, VpnConnectionMonitor, VpnConnectionReason, VpnConnectionState, VpnInterface,
};

const ACTIVE_PATH: &str = "/org/freedesktop/NetworkManager/ActiveConnection/7";
const DEADLINE: Duration = Duration::from_secs(5);

fn handle() -> ConnectionHandle {
    ConnectionHandle::try_from(ACTIVE_PATH).unwrap()
}

fn vpn_interface() -> VpnInterface {
    VpnInterface {
        path: OwnedObjectPath::try_from("/org/freedesktop/NetworkManager/Devices/9").unwrap(),
        interface: "proton0".into(),
        device_type: 16,
    }
}

fn activating() -> PreparationStatus {
    PreparationStatus {
        is_target: true,
        activation_state: ActiveConnectionState::Activating,
        handle: Some(handle()),
    }
}

#[derive(Default)]
struct FakeService {
    interface: Option<VpnInterface>,
    statuses: Mutex<VecDeque<PreparationStatus>>,
    stale: bool,
    events: Mutex<Option<RawStateStream>>,
    polls: AtomicU32,
    subscriptions: AtomicU32,
}

impl FakeService {
    /// A VPN device exists and the target connection is activating.
    fn activating() -> (UnboundedSender<(u32, u32)>, Arc<Self>) {
        Self::with_statuses(vec![activating()])
    }

    fn with_statuses(statuses: Vec<PreparationStatus>) -> (UnboundedSender<(u32, u32)>, Arc<Self>) {
        let (tx, rx) = unbounded();
        let service = Self {
            interface: Some(vpn_interface()),
            statuses: Mutex::new(statuses.into()),
            events: Mutex::new(Some(rx.boxed())),
            ..Self::default()
        };
        (tx, Arc::new(service))
    }

    fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    fn subscriptions(&self) -> u32 {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkService for FakeService {
    async fn find_vpn_interface(&self) -> nmvpn::Result<Option<VpnInterface>> {
        Ok(self.interface.clone())
    }

    async fn target_vpn_being_prepared(&self) -> nmvpn::Result<PreparationStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(PreparationStatus::absent))
    }

    async fn active_connection_properties(
        &self,
        handle: &ConnectionHandle,
    ) -> nmvpn::Result<ConnectionProperties> {
        if self.stale {
            return Err(MonitorError::NotActiveConnection(handle.to_string()));
        }
        Ok(ConnectionProperties {
            id: "ProtonVPN CH#1".into(),
            uuid: "5b4b7a3e-3f0c-4a8e-9d0b-1f2e3d4c5b6a".into(),
            connection_type: "vpn".into(),
            vpn: true,
            state: ActiveConnectionState::Activating,
        })
    }

    async fn subscribe_state_changes(
        &self,
        handle: &ConnectionHandle,
    ) -> nmvpn::Result<RawStateStream> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| MonitorError::Subscription(format!("{handle} already subscribed")))
    }
}

struct FakeKillSwitch {
    setting: KillSwitchSetting,
    fail: bool,
    actions: Mutex<Vec<KillSwitchAction>>,
}

impl FakeKillSwitch {
    fn new(setting: KillSwitchSetting) -> Arc<Self> {
        Arc::new(Self {
            setting,
            fail: false,
            actions: Mutex::new(Vec::new()),
        })
    }

    fn failing(setting: KillSwitchSetting) -> Arc<Self> {
        Arc::new(Self {
            setting,
            fail: true,
            actions: Mutex::new(Vec::new()),
        })
    }

    fn actions(&self) -> Vec<KillSwitchAction> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl KillSwitch for FakeKillSwitch {
    fn setting(&self) -> KillSwitchSetting {
        self.setting
    }

    async fn manage(&self, action: KillSwitchAction) -> nmvpn::Result<()> {
        self.actions.lock().unwrap().push(action);
        if self.fail {
            return Err(MonitorError::KillSwitch("firewall unavailable".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeSession {
    fail: bool,
    delay: Option<Duration>,
    refreshes: AtomicU32,
}

impl FakeSession {
    fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerSession for FakeSession {
    async fn update_servers_if_needed(&self) -> nmvpn::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MonitorError::Session("stale session".into()));
        }
        Ok(())
    }
}

struct Harness {
    event_loop: MonitorLoop,
    outcome: SharedOutcome,
    kill_switch: Arc<FakeKillSwitch>,
    session: Arc<FakeSession>,
}

impl Harness {
    fn new(kill_switch: Arc<FakeKillSwitch>, session: Arc<FakeSession>) -> Self {
        Self {
            event_loop: MonitorLoop::new(),
            outcome: SharedOutcome::new(),
            kill_switch,
            session,
        }
    }

    fn default_collaborators() -> Self {
        Self::new(
            FakeKillSwitch::new(KillSwitchSetting::Off),
            Arc::new(FakeSession::default()),
        )
    }

    async fn start(
        &self,
        service: Arc<FakeService>,
        config: MonitorConfig,
    ) -> nmvpn::Result<VpnConnectionMonitor> {
        let effects = SideEffects::new(self.kill_switch.clone(), self.session.clone());
        VpnConnectionMonitor::start(
            service,
            effects,
            config,
            &self.event_loop,
            self.outcome.clone(),
        )
        .await
    }
}

#[tokio::test]
async fn missing_vpn_device_resolves_not_found_before_returning() {
    let service = Arc::new(FakeService::default());
    let h = Harness::default_collaborators();

    let monitor = h
        .start(service.clone(), MonitorConfig::default())
        .await
        .unwrap();

    assert_eq!(monitor.phase(), MonitorPhase::Resolved);
    assert!(!h.event_loop.is_running());
    assert_eq!(h.outcome.get(), Some(&ConnectionOutcome::not_found()));
    assert_eq!(service.polls(), 0);
    assert_eq!(service.subscriptions(), 0);
}

#[tokio::test]
async fn active_notification_resolves_success() {
    let (tx, service) = FakeService::activating();
    let h = Harness::new(
        FakeKillSwitch::new(KillSwitchSetting::Hard),
        Arc::new(FakeSession::default()),
    );

    let mut monitor = h
        .start(service.clone(), MonitorConfig::default())
        .await
        .unwrap();
    assert_eq!(monitor.phase(), MonitorPhase::Subscribed);
    assert_eq!(monitor.subscribed_to(), Some(&handle()));

    tx.unbounded_send((5, 0)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.state, VpnConnectionState::Activated);
    assert_eq!(outcome.reason, VpnConnectionReason::Unknown);
    assert_eq!(outcome.message, "Successfully connected to Proton VPN.");
    assert!(outcome.is_success());

    assert!(!h.event_loop.is_running());
    assert_eq!(monitor.phase(), MonitorPhase::Resolved);
    assert_eq!(h.kill_switch.actions(), vec![KillSwitchAction::PostConnection]);

    monitor.wait_for_refresh().await;
    assert_eq!(h.session.refreshes(), 1);
}

#[tokio::test]
async fn slow_refresh_does_not_delay_success() {
    let (tx, service) = FakeService::activating();
    let session = Arc::new(FakeSession {
        delay: Some(Duration::from_millis(500)),
        ..FakeSession::default()
    });
    let h = Harness::new(FakeKillSwitch::new(KillSwitchSetting::Off), session);

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((5, 0)).unwrap();
    monitor.run_for(Duration::from_millis(100)).await.unwrap();

    assert!(!h.event_loop.is_running());
    assert!(h.outcome.get().unwrap().is_success());
    assert_eq!(h.session.refreshes(), 0);

    monitor.wait_for_refresh().await;
    assert_eq!(h.session.refreshes(), 1);
    assert!(h.outcome.get().unwrap().is_success());
}

#[tokio::test]
async fn soft_kill_switch_requests_soft_transition() {
    let (tx, service) = FakeService::activating();
    let h = Harness::new(
        FakeKillSwitch::new(KillSwitchSetting::Soft),
        Arc::new(FakeSession::default()),
    );

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((5, 1)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    assert_eq!(h.kill_switch.actions(), vec![KillSwitchAction::Soft]);
}

#[tokio::test]
async fn disabled_kill_switch_is_not_invoked() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((5, 1)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    assert!(h.kill_switch.actions().is_empty());
    assert!(h.outcome.get().unwrap().is_success());
}

#[tokio::test]
async fn refresh_failure_does_not_change_success() {
    let (tx, service) = FakeService::activating();
    let session = Arc::new(FakeSession {
        fail: true,
        ..FakeSession::default()
    });
    let h = Harness::new(FakeKillSwitch::new(KillSwitchSetting::Off), session);

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((5, 1)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();
    monitor.wait_for_refresh().await;

    assert_eq!(h.session.refreshes(), 1);
    assert!(!h.event_loop.is_running());
    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.state, VpnConnectionState::Activated);
    assert_eq!(outcome.message, "Successfully connected to Proton VPN.");
}

#[tokio::test]
async fn kill_switch_failure_propagates_without_outcome() {
    let (tx, service) = FakeService::activating();
    let h = Harness::new(
        FakeKillSwitch::failing(KillSwitchSetting::Hard),
        Arc::new(FakeSession::default()),
    );

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((5, 1)).unwrap();
    let err = monitor.run_for(DEADLINE).await.unwrap_err();

    assert!(matches!(err, MonitorError::KillSwitch(_)));
    assert!(h.outcome.get().is_none());
    assert_eq!(h.session.refreshes(), 0);
}

#[tokio::test]
async fn failed_timeout_reports_time_out() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((6, 6)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.state, VpnConnectionState::Failed);
    assert_eq!(outcome.reason, VpnConnectionReason::ConnectTimeout);
    assert!(outcome.message.ends_with("VPN connection time out."));
    assert!(h.kill_switch.actions().is_empty());
    assert_eq!(h.session.refreshes(), 0);
}

#[tokio::test]
async fn failed_without_secrets_reports_credentials() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((6, 9)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.reason, VpnConnectionReason::NoSecrets);
    assert!(outcome.message.ends_with("incorrect openvpn credentials."));
}

#[tokio::test]
async fn failed_other_reason_reports_unknown() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((6, 10)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.reason, VpnConnectionReason::LoginFailed);
    assert!(outcome.message.ends_with("unknown reason."));
}

#[tokio::test]
async fn disconnect_has_its_own_message() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((7, 2)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.state, VpnConnectionState::Disconnected);
    assert_eq!(
        outcome.message,
        format!(
            "Proton VPN connection has been disconnected. Reason: {}",
            VpnConnectionReason::UserDisconnected
        )
    );
}

#[tokio::test]
async fn intermediate_states_are_ignored() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((1, 1)).unwrap();
    tx.unbounded_send((3, 1)).unwrap();
    tx.unbounded_send((4, 1)).unwrap();
    tx.unbounded_send((7, 3)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.state, VpnConnectionState::Disconnected);
    assert_eq!(outcome.reason, VpnConnectionReason::DeviceDisconnected);
}

#[tokio::test]
async fn first_terminal_notification_wins() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    tx.unbounded_send((6, 6)).unwrap();
    tx.unbounded_send((5, 1)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    // Running again on a stopped loop must not consume the pending notification.
    monitor.run_for(DEADLINE).await.unwrap();

    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.state, VpnConnectionState::Failed);
    assert_eq!(outcome.reason, VpnConnectionReason::ConnectTimeout);
    assert_eq!(h.session.refreshes(), 0);
}

#[tokio::test]
async fn stale_handle_skips_subscription() {
    let service = Arc::new(FakeService {
        stale: true,
        interface: Some(vpn_interface()),
        statuses: Mutex::new(vec![activating()].into()),
        ..FakeService::default()
    });
    let h = Harness::default_collaborators();

    let mut monitor = h
        .start(service.clone(), MonitorConfig::default())
        .await
        .unwrap();

    assert_eq!(monitor.phase(), MonitorPhase::Searching);
    assert!(!monitor.is_subscribed());
    assert_eq!(service.subscriptions(), 0);

    let err = monitor
        .run_for(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::Timeout));
    assert!(h.outcome.get().is_none());
    assert!(!h.event_loop.is_running());
}

#[tokio::test]
async fn not_activating_target_waits_for_caller() {
    let (_tx, service) = FakeService::with_statuses(vec![PreparationStatus {
        is_target: true,
        activation_state: ActiveConnectionState::Activated,
        handle: Some(handle()),
    }]);
    let h = Harness::default_collaborators();

    let mut monitor = h
        .start(service.clone(), MonitorConfig::default())
        .await
        .unwrap();
    assert_eq!(monitor.phase(), MonitorPhase::Searching);
    assert_eq!(service.subscriptions(), 0);

    let err = monitor
        .run_for(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::Timeout));
    assert_eq!(service.polls(), 1);
}

#[tokio::test]
async fn bounded_retry_gives_up_after_max_attempts() {
    let (_tx, service) = FakeService::with_statuses(vec![PreparationStatus::absent()]);
    let h = Harness::default_collaborators();
    let config = MonitorConfig::default()
        .with_retry(RetryPolicy::Bounded)
        .with_max_attempts(3)
        .with_retry_delay_ms(10);

    let mut monitor = h.start(service.clone(), config).await.unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    assert_eq!(service.polls(), 3);
    assert_eq!(monitor.attempts(), 3);
    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.state, VpnConnectionState::Failed);
    assert_eq!(outcome.reason, VpnConnectionReason::ConnectTimeout);
    assert!(outcome.message.ends_with("VPN connection time out."));
}

#[tokio::test]
async fn bounded_retry_subscribes_once_activation_appears() {
    let (tx, service) =
        FakeService::with_statuses(vec![PreparationStatus::absent(), activating()]);
    let h = Harness::default_collaborators();
    let config = MonitorConfig::default()
        .with_retry(RetryPolicy::Bounded)
        .with_retry_delay_ms(10);

    let mut monitor = h.start(service.clone(), config).await.unwrap();
    assert!(!monitor.is_subscribed());

    tx.unbounded_send((6, 9)).unwrap();
    monitor.run_for(DEADLINE).await.unwrap();

    assert_eq!(service.polls(), 2);
    assert_eq!(service.subscriptions(), 1);
    let outcome = h.outcome.get().unwrap();
    assert_eq!(outcome.reason, VpnConnectionReason::NoSecrets);
}

#[tokio::test]
async fn ended_stream_drops_subscription() {
    let (tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    drop(tx);

    let err = monitor
        .run_for(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::Timeout));
    assert!(!monitor.is_subscribed());
    assert_eq!(monitor.phase(), MonitorPhase::Searching);
    assert!(h.outcome.get().is_none());
}

#[tokio::test]
async fn external_quit_ends_run() {
    let (_tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let mut monitor = h.start(service, MonitorConfig::default()).await.unwrap();
    let event_loop = h.event_loop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        event_loop.quit();
    });

    monitor.run_for(DEADLINE).await.unwrap();
    assert!(h.outcome.get().is_none());
    assert_eq!(monitor.phase(), MonitorPhase::Subscribed);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let (_tx, service) = FakeService::activating();
    let h = Harness::default_collaborators();

    let err = h
        .start(service.clone(), MonitorConfig::default().with_max_attempts(0))
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::InvalidConfig(_)));
    assert_eq!(service.polls(), 0);
}
