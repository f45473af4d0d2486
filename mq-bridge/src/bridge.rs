/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::audit::AuditSink;
use crate::broker::Broker;
use crate::config::BridgeConfig;
use crate::control_plane::channel_lifecycle;
use crate::control_plane::channel_registry::ChannelRegistry;
use crate::data_plane::consumer;
use crate::error::BridgeError;
use crate::runtime::connection_supervisor::ConnectionSupervisor;
use crate::subscription::{SubscriptionConfig, SubscriptionLookup};
use crate::webhook::WebhookForwarder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const BRIDGE_TAG: &str = "Bridge:";
const BRIDGE_FN_SUBSCRIBE_TAG: &str = "subscribe():";
const BRIDGE_FN_UNSUBSCRIBE_TAG: &str = "unsubscribe():";

/// State shared by the facade, the channel watchers and the consumers.
pub(crate) struct BridgeShared {
    pub(crate) connection: ConnectionSupervisor,
    pub(crate) registry: ChannelRegistry,
    pub(crate) lookup: Arc<dyn SubscriptionLookup>,
    pub(crate) forwarder: Arc<dyn WebhookForwarder>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) refresh_retry_interval: Duration,
}

/// Queue-to-webhook bridge.
///
/// Cloning is cheap; every clone drives the same connection and registry.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<BridgeShared>,
}

impl Bridge {
    /// Connects to `config.broker_url`. Fails only if the broker is unreachable
    /// right now; later disconnects are recovered in the background.
    pub async fn connect(
        config: &BridgeConfig,
        broker: Arc<dyn Broker>,
        lookup: Arc<dyn SubscriptionLookup>,
        forwarder: Arc<dyn WebhookForwarder>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, BridgeError> {
        let connection =
            ConnectionSupervisor::open(broker, &config.broker_url, config.reconnect_interval())
                .await?;

        Ok(Self {
            shared: Arc::new(BridgeShared {
                connection,
                registry: ChannelRegistry::new(),
                lookup,
                forwarder,
                audit,
                refresh_retry_interval: config.refresh_retry_interval(),
            }),
        })
    }

    pub async fn open_channel(&self, identity: &str) -> Result<(), BridgeError> {
        channel_lifecycle::open_channel(&self.shared, identity).await
    }

    pub async fn start_consuming(&self, config: SubscriptionConfig) -> Result<(), BridgeError> {
        consumer::start_consuming(&self.shared, config).await
    }

    pub async fn close_channel(&self, identity: &str) -> Result<(), BridgeError> {
        channel_lifecycle::close_channel(&self.shared, identity).await
    }

    /// Opens a channel for `identity` and starts consuming with its current
    /// configuration. The channel is closed again if either step fails.
    pub async fn subscribe(&self, identity: &str) -> Result<(), BridgeError> {
        debug!("{BRIDGE_TAG}:{BRIDGE_FN_SUBSCRIBE_TAG} subscribing {identity:?}");

        self.open_channel(identity).await?;

        let started = match self.shared.lookup.subscription_config(identity).await {
            Ok(config) => self.start_consuming(config).await,
            Err(err) => Err(BridgeError::from(err)),
        };

        if let Err(err) = started {
            error!("{BRIDGE_TAG}:{BRIDGE_FN_SUBSCRIBE_TAG} unable to subscribe {identity:?}: {err}");
            if let Err(close_err) = self.close_channel(identity).await {
                debug!("{BRIDGE_TAG}:{BRIDGE_FN_SUBSCRIBE_TAG} rollback close failed: {close_err}");
            }
            return Err(err);
        }

        Ok(())
    }

    /// Deliberate teardown of `identity`; no refresh follows.
    pub async fn unsubscribe(&self, identity: &str) -> Result<(), BridgeError> {
        debug!("{BRIDGE_TAG}:{BRIDGE_FN_UNSUBSCRIBE_TAG} unsubscribing {identity:?}");

        self.close_channel(identity).await
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connection.is_connected()
    }

    /// Number of successful reconnects since [`Bridge::connect`].
    pub fn reconnect_count(&self) -> u64 {
        self.shared.connection.reconnect_count()
    }

    pub fn is_ready(&self, identity: &str) -> bool {
        self.shared.registry.is_ready(identity)
    }

    pub fn has_channel(&self, identity: &str) -> bool {
        self.shared.registry.has_channel(identity)
    }

    /// Identities currently holding a channel, sorted.
    pub fn identities(&self) -> Vec<String> {
        self.shared.registry.identities()
    }
}
