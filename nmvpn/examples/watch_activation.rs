/// Watch a VPN activation that was already requested (e.g. with `nmcli con up`)
/// and print how it ended.
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use nmvpn::{
    KillSwitch, KillSwitchAction, KillSwitchSetting, MonitorConfig, MonitorLoop, RetryPolicy,
    ServerSession, SharedOutcome, SideEffects, VpnConnectionMonitor,
};

struct PrintKillSwitch;

#[async_trait]
impl KillSwitch for PrintKillSwitch {
    fn setting(&self) -> KillSwitchSetting {
        KillSwitchSetting::Off
    }

    async fn manage(&self, action: KillSwitchAction) -> nmvpn::Result<()> {
        println!("kill switch: {action}");
        Ok(())
    }
}

struct NoSession;

#[async_trait]
impl ServerSession for NoSession {
    async fn update_servers_if_needed(&self) -> nmvpn::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> nmvpn::Result<()> {
    env_logger::init();

    let config = MonitorConfig::default()
        .with_retry(RetryPolicy::Bounded)
        .with_connection_prefix(
            std::env::var("VPN_CONNECTION_PREFIX").unwrap_or_else(|_| "ProtonVPN".into()),
        );

    let event_loop = MonitorLoop::new();
    let outcome = SharedOutcome::new();
    let effects = SideEffects::new(Arc::new(PrintKillSwitch), Arc::new(NoSession));

    let mut monitor =
        VpnConnectionMonitor::system(effects, config, &event_loop, outcome.clone()).await?;
    println!("Monitor phase: {}", monitor.phase());

    monitor.run_for(Duration::from_secs(60)).await?;

    match outcome.get() {
        Some(result) => println!("{result}"),
        None => println!("No outcome"),
    }

    monitor.wait_for_refresh().await;

    Ok(())
}
