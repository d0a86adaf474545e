//! VPN state-change subscription for a single active connection.
//!
//! Raw `VpnStateChanged` signals are decoded and pushed onto a channel that
//! the monitor drains on its own task, so only the resolver ever touches
//! the outcome.

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Result;
use crate::api::models::{ConnectionHandle, MonitorError, StateChange};
use crate::api::traits::NetworkService;

/// A live listener on one connection's state changes.
///
/// Dropping it tears the listener down.
#[derive(Debug)]
pub(crate) struct Subscription {
    handle: ConnectionHandle,
    events: mpsc::UnboundedReceiver<StateChange>,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Next decoded notification, or `None` once the signal stream has ended.
    pub(crate) async fn next(&mut self) -> Option<StateChange> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Attaches a state-change listener to `handle`.
///
/// A handle that is no longer an active connection is a benign race (the
/// connection dropped between discovery and subscription): it is logged and
/// reported as `Ok(None)`. Other D-Bus failures are returned.
pub(crate) async fn subscribe(
    service: &dyn NetworkService,
    handle: &ConnectionHandle,
) -> Result<Option<Subscription>> {
    match service.active_connection_properties(handle).await {
        Ok(props) => {
            info!(
                "Adding listener to active {} connection at {handle}",
                props.id
            );
        }
        Err(MonitorError::NotActiveConnection(_)) => {
            info!("{handle} is not an active connection.");
            return Ok(None);
        }
        Err(e) => return Err(e),
    }

    let mut stream = match service.subscribe_state_changes(handle).await {
        Ok(stream) => stream,
        Err(MonitorError::Subscription(e)) => {
            warn!("Could not attach listener to {handle}: {e}");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let (tx, events) = mpsc::unbounded_channel();
    let path = handle.clone();
    let forwarder = tokio::spawn(async move {
        while let Some((state, reason)) = stream.next().await {
            if tx.send(StateChange::from_raw(state, reason)).is_err() {
                break;
            }
        }
        debug!("VPN state stream for {path} ended");
    });

    debug!("Subscribed to VpnStateChanged on {handle}");
    Ok(Some(Subscription {
        handle: handle.clone(),
        events,
        forwarder,
    }))
}
