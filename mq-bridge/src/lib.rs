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

//! # mq-bridge
//!
//! `mq-bridge` consumes messages from broker queues and forwards each payload to
//! a webhook, one subscription identity at a time. Every delivery is validated,
//! forwarded, acknowledged or rejected, and described by an audit record.
//!
//! The bridge supervises its own broker plumbing: a lost connection is redialed
//! at a fixed interval for as long as it takes, and a lost channel is reopened
//! and consumption restarted for every identity that was actively consuming.
//!
//! ## Subscribing and unsubscribing
//!
//! ```
//! use std::sync::Arc;
//! use integration_test_utils::{FixedLookup, InMemoryBroker, RecordingAuditSink, ScriptedForwarder};
//! use mq_bridge::{Bridge, BridgeConfig, SubscriptionConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let broker = InMemoryBroker::new();
//! let lookup = Arc::new(FixedLookup::new([SubscriptionConfig::new(
//!     "orders-1",
//!     "orders",
//!     "https://hook.example/x",
//!     "s3cret",
//! )]));
//! let forwarder = Arc::new(ScriptedForwarder::default());
//! let audit = Arc::new(RecordingAuditSink::default());
//!
//! let bridge = Bridge::connect(
//!     &BridgeConfig::default(),
//!     Arc::new(broker.clone()),
//!     lookup,
//!     forwarder,
//!     audit,
//! )
//! .await
//! .unwrap();
//!
//! bridge.subscribe("orders-1").await.unwrap();
//! assert!(bridge.is_ready("orders-1"));
//!
//! // deliberate teardown never triggers a channel refresh
//! bridge.unsubscribe("orders-1").await.unwrap();
//! assert!(!bridge.has_channel("orders-1"));
//! assert!(bridge.unsubscribe("orders-1").await.is_err());
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - Broker seam: [`Broker`], [`BrokerConnection`], [`BrokerChannel`] and [`Delivery`]
//! - Runtime: the connection supervisor and its reconnect loop
//! - Control plane: the per-identity channel registry and channel supervision
//! - Data plane: consumption and the per-message dispatch loop
//! - Collaborators: [`SubscriptionLookup`], [`WebhookForwarder`], [`AuditSink`]
//!
//! ## Observability model
//!
//! The crate uses `tracing` for logs/events. Library code emits events and never
//! installs a global subscriber; binaries and tests are responsible for one-time
//! `tracing_subscriber` initialization.

mod audit;
mod bridge;
mod broker;
mod config;
mod control_plane;
mod data_plane;
mod error;
mod runtime;
mod subscription;
mod webhook;

#[doc(hidden)]
pub mod observability;

pub use audit::{AuditRecord, AuditSink, MessageEnvelope, TracingAuditSink};
pub use bridge::Bridge;
pub use broker::{
    Broker, BrokerChannel, BrokerConnection, BrokerError, CloseNotification, ConsumeOptions,
    Delivery, DeliveryAcker, DeliveryStream,
};
pub use config::{BridgeConfig, DEFAULT_BROKER_URL, DEFAULT_RECONNECT_INTERVAL_MS};
pub use error::{BridgeError, ConfigError};
pub use subscription::{LookupError, SubscriptionConfig, SubscriptionLookup};
pub use webhook::{ForwardError, ForwardRequest, ForwardResponse, WebhookForwarder};
