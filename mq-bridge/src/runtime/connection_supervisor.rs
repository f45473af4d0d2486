//! Owner of the single broker connection and its reconnect loop.

use crate::broker::{Broker, BrokerConnection, BrokerError, CloseNotification};
use crate::error::BridgeError;
use crate::observability::events;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

const COMPONENT: &str = "connection_supervisor";

struct LiveConnection {
    handle: Arc<dyn BrokerConnection>,
}

struct ConnectionState {
    address: String,
    broker: Arc<dyn Broker>,
    reconnect_interval: Duration,
    // None while a reconnect is in progress.
    current: ArcSwapOption<LiveConnection>,
    // mirrors `current.is_some()` for tasks that need to wait on it
    connected: watch::Sender<bool>,
    reconnects: AtomicU64,
}

pub(crate) struct ConnectionSupervisor {
    state: Arc<ConnectionState>,
    watcher: JoinHandle<()>,
}

impl ConnectionSupervisor {
    /// Dials `address` and starts watching the connection.
    ///
    /// Only this first dial surfaces an error; every later disconnect is
    /// recovered by the watcher.
    pub(crate) async fn open(
        broker: Arc<dyn Broker>,
        address: &str,
        reconnect_interval: Duration,
    ) -> Result<Self, BridgeError> {
        let handle = broker
            .dial(address)
            .await
            .map_err(BridgeError::Connection)?;
        let close = handle.notify_close();

        info!(
            event = events::CONNECTION_OPENED,
            component = COMPONENT,
            address,
            "broker connection opened"
        );

        let (connected, _) = watch::channel(true);
        let state = Arc::new(ConnectionState {
            address: address.to_string(),
            broker,
            reconnect_interval,
            current: ArcSwapOption::from_pointee(LiveConnection { handle }),
            connected,
            reconnects: AtomicU64::new(0),
        });
        let watcher = tokio::spawn(watch_connection(state.clone(), close));

        Ok(Self { state, watcher })
    }

    pub(crate) fn current(&self) -> Option<Arc<dyn BrokerConnection>> {
        self.state
            .current
            .load_full()
            .map(|live| live.handle.clone())
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state.current.load().is_some()
    }

    pub(crate) fn reconnect_count(&self) -> u64 {
        self.state.reconnects.load(Ordering::SeqCst)
    }

    /// Resolves once a connection is live. Returns right away if one already is.
    pub(crate) async fn wait_connected(&self) {
        let mut connected = self.state.connected.subscribe();
        let _ = connected.wait_for(|connected| *connected).await;
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn watch_connection(state: Arc<ConnectionState>, mut close: CloseNotification) {
    loop {
        let reason = close
            .await
            .unwrap_or_else(|_| BrokerError::ConnectionClosed("close notifier dropped".to_string()));
        state.current.store(None);
        state.connected.send_replace(false);

        error!(
            event = events::CONNECTION_LOST,
            component = COMPONENT,
            address = %state.address,
            err = %reason,
            "broker connection has been disconnected"
        );

        close = reconnect(&state).await;
    }
}

async fn reconnect(state: &ConnectionState) -> CloseNotification {
    let mut attempt: u64 = 0;
    loop {
        tokio::time::sleep(state.reconnect_interval).await;
        attempt += 1;

        info!(
            event = events::RECONNECT_ATTEMPT,
            component = COMPONENT,
            address = %state.address,
            attempt,
            "trying to reconnect"
        );

        match state.broker.dial(&state.address).await {
            Ok(handle) => {
                let close = handle.notify_close();
                state.current.store(Some(Arc::new(LiveConnection { handle })));
                state.connected.send_replace(true);
                state.reconnects.fetch_add(1, Ordering::SeqCst);
                info!(
                    event = events::RECONNECT_SUCCEEDED,
                    component = COMPONENT,
                    address = %state.address,
                    attempt,
                    "reconnected to broker"
                );
                return close;
            }
            Err(err) => {
                error!(
                    event = events::RECONNECT_FAILED,
                    component = COMPONENT,
                    address = %state.address,
                    attempt,
                    err = %err,
                    "reconnect attempt failed"
                );
            }
        }
    }
}
