//! Per-identity channel supervision: open, watch, refresh, close.

use crate::bridge::BridgeShared;
use crate::broker::{BrokerChannel, BrokerError, CloseNotification};
use crate::data_plane::consumer::start_consuming_in;
use crate::error::BridgeError;
use crate::observability::events;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "channel_supervisor";

/// Opens a channel for `identity` on the current connection and watches it.
///
/// A channel already held for the identity is retired: its watcher is released
/// first, then the handle is closed.
pub(crate) async fn open_channel(
    shared: &Arc<BridgeShared>,
    identity: &str,
) -> Result<(), BridgeError> {
    open_watched_channel(shared, identity).await.map(|_| ())
}

async fn open_watched_channel(
    shared: &Arc<BridgeShared>,
    identity: &str,
) -> Result<Arc<dyn BrokerChannel>, BridgeError> {
    let connection = shared
        .connection
        .current()
        .ok_or(BridgeError::Disconnected)?;
    let channel = connection
        .open_channel()
        .await
        .map_err(|err| BridgeError::channel(identity, err))?;

    let done = shared.registry.arm_done(identity);
    let close = channel.notify_close();

    if let Some(previous) = shared.registry.replace_channel(identity, channel.clone()) {
        debug!(
            event = events::CHANNEL_REPLACED,
            component = COMPONENT,
            identity,
            "retiring previous channel"
        );
        if let Err(err) = previous.close().await {
            debug!(
                event = events::CHANNEL_REPLACED,
                component = COMPONENT,
                identity,
                err = %err,
                "previous channel was already closed"
            );
        }
    }

    info!(
        event = events::CHANNEL_OPENED,
        component = COMPONENT,
        identity,
        "channel opened"
    );

    spawn_channel_watcher(shared.clone(), identity.to_string(), done, close);
    Ok(channel)
}

/// Deliberate teardown. Never triggers a refresh.
///
/// Starts a new teardown generation, so a refresh already in flight for the
/// identity discards whatever it opens afterwards.
pub(crate) async fn close_channel(shared: &BridgeShared, identity: &str) -> Result<(), BridgeError> {
    shared.registry.begin_teardown(identity);
    let released = shared.registry.signal_done(identity);

    let channel = shared
        .registry
        .remove_channel(identity)
        .ok_or_else(|| BridgeError::ChannelNotFound(identity.to_string()))?;

    channel
        .close()
        .await
        .map_err(|err| BridgeError::channel(identity, err))?;

    info!(
        event = events::CHANNEL_CLOSED,
        component = COMPONENT,
        identity,
        watcher_released = released,
        "channel closed"
    );
    Ok(())
}

fn spawn_channel_watcher(
    shared: Arc<BridgeShared>,
    identity: String,
    done: oneshot::Receiver<()>,
    close: CloseNotification,
) {
    tokio::spawn(async move {
        tokio::select! {
            biased;

            _ = done => {
                debug!(
                    event = events::CHANNEL_RELEASED,
                    component = COMPONENT,
                    identity = %identity,
                    "channel watcher released"
                );
            }
            reason = close => {
                let reason = reason
                    .unwrap_or_else(|_| BrokerError::ChannelClosed("close notifier dropped".to_string()));
                error!(
                    event = events::CHANNEL_LOST,
                    component = COMPONENT,
                    identity = %identity,
                    err = %reason,
                    "channel has been disconnected"
                );
                if shared.registry.is_ready(&identity) {
                    refresh_channel(&shared, &identity).await;
                } else {
                    debug!(
                        event = events::CHANNEL_LOST,
                        component = COMPONENT,
                        identity = %identity,
                        "consumption not established, leaving channel down"
                    );
                }
            }
        }
    });
}

/// Reopens the channel and restarts consumption with a freshly looked-up config.
///
/// Open and lookup failures are retried; a consume failure is retried only while
/// the identity stays ready. A lost connection is waited out rather than
/// retried. A deliberate teardown at any point ends the loop, and a channel
/// opened after it is closed again.
async fn refresh_channel(shared: &Arc<BridgeShared>, identity: &str) {
    let mut attempt: u64 = 0;
    loop {
        let generation = shared.registry.generation(identity);
        if !shared.registry.is_ready(identity) {
            abandon(identity, attempt, "readiness_cleared");
            return;
        }

        if attempt > 0 {
            pause(shared).await;
        }
        attempt += 1;
        debug!(
            event = events::CHANNEL_REFRESH_ATTEMPT,
            component = COMPONENT,
            identity,
            attempt,
            "refreshing channel"
        );

        let channel = match open_watched_channel(shared, identity).await {
            Ok(channel) => channel,
            Err(BridgeError::Disconnected) => {
                debug!(
                    event = events::CHANNEL_REFRESH_ATTEMPT,
                    component = COMPONENT,
                    identity,
                    attempt,
                    "waiting for the broker connection"
                );
                shared.connection.wait_connected().await;
                continue;
            }
            Err(err) => {
                debug!(
                    event = events::CHANNEL_REFRESH_ATTEMPT,
                    component = COMPONENT,
                    identity,
                    attempt,
                    err = %err,
                    "unable to reopen channel"
                );
                continue;
            }
        };

        if torn_down_since(shared, identity, generation) {
            discard_channel(shared, identity, channel).await;
            abandon(identity, attempt, "torn_down");
            return;
        }

        let config = match shared.lookup.subscription_config(identity).await {
            Ok(config) => config,
            Err(err) => {
                debug!(
                    event = events::CHANNEL_REFRESH_ATTEMPT,
                    component = COMPONENT,
                    identity,
                    attempt,
                    err = %err,
                    "unable to look up subscription"
                );
                continue;
            }
        };

        if torn_down_since(shared, identity, generation) {
            discard_channel(shared, identity, channel).await;
            abandon(identity, attempt, "torn_down");
            return;
        }

        if let Err(err) = start_consuming_in(shared, config, generation).await {
            if torn_down_since(shared, identity, generation) {
                discard_channel(shared, identity, channel).await;
                abandon(identity, attempt, "torn_down");
                return;
            }
            if shared.registry.is_ready(identity) {
                continue;
            }
            warn!(
                event = events::CHANNEL_REFRESH_ABANDONED,
                component = COMPONENT,
                identity,
                attempt,
                err = %err,
                reason = "consume_failed",
                "channel refresh abandoned"
            );
            return;
        }

        info!(
            event = events::CHANNEL_REFRESH_SUCCEEDED,
            component = COMPONENT,
            identity,
            attempt,
            "channel refresh succeeded"
        );
        return;
    }
}

fn torn_down_since(shared: &BridgeShared, identity: &str, generation: u64) -> bool {
    shared.registry.generation(identity) != generation
}

/// Closes a channel the refresh opened after the identity was torn down.
async fn discard_channel(shared: &BridgeShared, identity: &str, channel: Arc<dyn BrokerChannel>) {
    if shared.registry.remove_channel_if_current(identity, &channel) {
        shared.registry.signal_done(identity);
    }
    if let Err(err) = channel.close().await {
        debug!(
            event = events::CHANNEL_REFRESH_ABANDONED,
            component = COMPONENT,
            identity,
            err = %err,
            "discarded channel was already closed"
        );
    }
}

fn abandon(identity: &str, attempt: u64, reason: &'static str) {
    warn!(
        event = events::CHANNEL_REFRESH_ABANDONED,
        component = COMPONENT,
        identity,
        attempt,
        reason,
        "channel refresh abandoned"
    );
}

async fn pause(shared: &BridgeShared) {
    if shared.refresh_retry_interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(shared.refresh_retry_interval).await;
    }
}
