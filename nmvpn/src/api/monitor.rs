use futures::{FutureExt, select};
use futures_timer::Delay;
use log::{debug, info, warn};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::api::models::{
    ConnectionHandle, MonitorConfig, MonitorError, MonitorPhase, RetryPolicy, StateChange,
};
use crate::api::traits::NetworkService;
use crate::core::completion::{CompletionSink, MonitorLoop, SharedOutcome};
use crate::core::dispatch::SideEffects;
use crate::core::nm_client::NmClient;
use crate::core::resolver::OutcomeResolver;
use crate::monitoring::subscriber::{Subscription, subscribe};

/// Watches one VPN activation and resolves its outcome exactly once.
///
/// The monitor is built after an activation has been requested from
/// NetworkManager. Construction checks for the VPN device and the activation
/// in progress and, if found, attaches to the connection's state signal. The
/// caller then drives the loop with [`run`](Self::run) (or
/// [`run_for`](Self::run_for)) and reads the [`SharedOutcome`] once the
/// [`MonitorLoop`] has stopped.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use nmvpn::{
///     KillSwitch, KillSwitchAction, KillSwitchSetting, MonitorConfig, MonitorLoop,
///     ServerSession, SharedOutcome, SideEffects, VpnConnectionMonitor,
/// };
///
/// struct NoKillSwitch;
///
/// #[async_trait::async_trait]
/// impl KillSwitch for NoKillSwitch {
///     fn setting(&self) -> KillSwitchSetting {
///         KillSwitchSetting::Off
///     }
///
///     async fn manage(&self, _action: KillSwitchAction) -> nmvpn::Result<()> {
///         Ok(())
///     }
/// }
///
/// struct Offline;
///
/// #[async_trait::async_trait]
/// impl ServerSession for Offline {
///     async fn update_servers_if_needed(&self) -> nmvpn::Result<()> {
///         Ok(())
///     }
/// }
///
/// # async fn example() -> nmvpn::Result<()> {
/// let event_loop = MonitorLoop::new();
/// let outcome = SharedOutcome::new();
/// let effects = SideEffects::new(Arc::new(NoKillSwitch), Arc::new(Offline));
///
/// let mut monitor = VpnConnectionMonitor::system(
///     effects,
///     MonitorConfig::default(),
///     &event_loop,
///     outcome.clone(),
/// )
/// .await?;
///
/// monitor.run_for(Duration::from_secs(60)).await?;
///
/// if let Some(result) = outcome.get() {
///     println!("{}", result.message);
/// }
/// # Ok(())
/// # }
/// ```
pub struct VpnConnectionMonitor {
    service: Arc<dyn NetworkService>,
    resolver: OutcomeResolver,
    config: MonitorConfig,
    subscription: Option<Subscription>,
    attempts: u32,
}

enum Step {
    Stopped,
    Notification(Option<StateChange>),
    Retry,
}

impl VpnConnectionMonitor {
    /// Creates a monitor and runs the initial check.
    ///
    /// Returns once the check has either resolved the outcome (no VPN device),
    /// attached a listener, or found nothing to attach to.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::InvalidConfig` for an unusable configuration and
    /// `MonitorError::Dbus` when NetworkManager cannot be queried. A stale
    /// connection handle is not an error.
    pub async fn start(
        service: Arc<dyn NetworkService>,
        effects: SideEffects,
        config: MonitorConfig,
        event_loop: &MonitorLoop,
        outcome: SharedOutcome,
    ) -> Result<Self> {
        config.validate()?;

        let sink = CompletionSink::new(outcome, event_loop.clone());
        let mut monitor = Self {
            service,
            resolver: OutcomeResolver::new(sink, effects),
            config,
            subscription: None,
            attempts: 0,
        };

        monitor.vpn_check().await?;
        Ok(monitor)
    }

    /// Creates a monitor backed by NetworkManager on the system D-Bus.
    pub async fn system(
        effects: SideEffects,
        config: MonitorConfig,
        event_loop: &MonitorLoop,
        outcome: SharedOutcome,
    ) -> Result<Self> {
        config.validate()?;
        let client = NmClient::system(&config).await?;
        Self::start(Arc::new(client), effects, config, event_loop, outcome).await
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MonitorPhase {
        self.resolver.phase()
    }

    /// Whether a state listener is attached.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// The connection the listener is attached to, if any.
    pub fn subscribed_to(&self) -> Option<&ConnectionHandle> {
        self.subscription.as_ref().map(Subscription::handle)
    }

    /// Number of activation checks performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Drives the monitor until its loop is stopped.
    ///
    /// Without a listener and with [`RetryPolicy::Disabled`], this waits for
    /// someone else to stop the loop; bound it with [`run_for`](Self::run_for).
    ///
    /// # Errors
    ///
    /// Kill switch failures are returned as-is; the outcome is left unwritten
    /// in that case.
    pub async fn run(&mut self) -> Result<()> {
        let event_loop = self.resolver.sink().event_loop().clone();

        loop {
            if !event_loop.is_running() {
                return Ok(());
            }

            let can_retry = self.can_retry();
            let retry_delay = self.config.retry_delay();

            let step = {
                let mut stopped = pin!(event_loop.stopped().fuse());
                match self.subscription.as_mut() {
                    Some(sub) => {
                        let mut next = pin!(sub.next().fuse());
                        select! {
                            _ = stopped => Step::Stopped,
                            change = next => Step::Notification(change),
                        }
                    }
                    None if can_retry => {
                        let mut delay = pin!(Delay::new(retry_delay).fuse());
                        select! {
                            _ = stopped => Step::Stopped,
                            _ = delay => Step::Retry,
                        }
                    }
                    None => {
                        stopped.await;
                        Step::Stopped
                    }
                }
            };

            match step {
                Step::Stopped => return Ok(()),
                Step::Notification(Some(change)) => self.resolver.handle(change).await?,
                Step::Notification(None) => {
                    warn!("VPN state stream ended before a terminal state");
                    self.subscription = None;
                    self.resolver.mark_unsubscribed();
                }
                Step::Retry => self.retry().await?,
            }
        }
    }

    /// Runs the monitor with a caller-imposed deadline.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Timeout` (after stopping the loop) if no outcome
    /// has been written when `deadline` elapses.
    pub async fn run_for(&mut self, deadline: Duration) -> Result<()> {
        let sink = self.resolver.sink().clone();
        let mut timeout = pin!(Delay::new(deadline).fuse());
        let mut run = pin!(self.run().fuse());

        select! {
            res = run => res,
            _ = timeout => {
                if sink.is_resolved() {
                    return Ok(());
                }
                warn!("VPN activation not resolved after {deadline:?}, stopping loop");
                sink.event_loop().quit();
                Err(MonitorError::Timeout)
            }
        }
    }

    /// Waits for the server refresh started on a successful connection.
    ///
    /// The refresh runs in the background and never affects the outcome;
    /// this is only needed by callers that want it settled before exiting.
    pub async fn wait_for_refresh(&mut self) {
        let Some(refresh) = self.resolver.take_refresh() else {
            return;
        };
        if let Err(e) = refresh.await {
            debug!("Server refresh task did not complete: {e}");
        }
    }

    async fn vpn_check(&mut self) -> Result<()> {
        self.resolver.begin_search();
        self.attempts += 1;

        if self.service.find_vpn_interface().await?.is_none() {
            self.resolver.resolve_not_found();
            return Ok(());
        }

        let status = self.service.target_vpn_being_prepared().await?;
        match status.activating_handle() {
            Some(handle) => {
                if let Some(sub) = subscribe(self.service.as_ref(), handle).await? {
                    self.subscription = Some(sub);
                    self.resolver.mark_subscribed();
                }
            }
            None => debug!(
                "Target VPN not activating (target: {}, state: {})",
                status.is_target, status.activation_state
            ),
        }

        Ok(())
    }

    fn can_retry(&self) -> bool {
        self.config.retry == RetryPolicy::Bounded && !self.resolver.is_resolved()
    }

    async fn retry(&mut self) -> Result<()> {
        if self.attempts >= self.config.max_attempts {
            self.resolver.resolve_timed_out(self.attempts);
            return Ok(());
        }

        info!(
            "Re-checking VPN activation (attempt {}/{})",
            self.attempts + 1,
            self.config.max_attempts
        );
        self.vpn_check().await
    }
}

impl std::fmt::Debug for VpnConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpnConnectionMonitor")
            .field("phase", &self.phase())
            .field("subscribed_to", &self.subscribed_to())
            .field("attempts", &self.attempts)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
