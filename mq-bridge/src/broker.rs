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

//! Broker protocol primitives the bridge depends on.
//!
//! The bridge only needs a handful of operations from a queueing broker: dial,
//! open a channel, consume with manual acknowledgement, ack/reject a delivery and
//! learn when a connection or channel has gone away. Client libraries are adapted
//! to these traits; nothing else in the crate talks to a broker directly.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// One-shot signal fired when a connection or channel closes.
///
/// A sender dropped without sending is treated as a close as well.
pub type CloseNotification = oneshot::Receiver<BrokerError>;

/// Stream of deliveries for one consumer. Ends when the channel closes.
pub type DeliveryStream = BoxStream<'static, Delivery>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    #[error("channel closed: {0}")]
    ChannelClosed(String),
    #[error("consume on queue {queue:?} refused: {reason}")]
    ConsumeRefused { queue: String, reason: String },
    #[error("acknowledgement of delivery {delivery_tag} failed: {reason}")]
    Acknowledgement { delivery_tag: u64, reason: String },
}

/// Flags passed along with a consume request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumeOptions {
    pub auto_ack: bool,
    pub exclusive: bool,
    pub no_local: bool,
    pub no_wait: bool,
}

impl ConsumeOptions {
    /// Every delivery has to be explicitly acked or rejected.
    pub fn manual_ack() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn dial(&self, address: &str) -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    /// Registers interest in the closing of this connection.
    fn notify_close(&self) -> CloseNotification;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;

    /// Registers interest in the closing of this channel.
    fn notify_close(&self) -> CloseNotification;
}

/// Settles deliveries on behalf of the channel they arrived on.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;
}

/// A single message received from a queue.
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    acker: Arc<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(delivery_tag: u64, body: Vec<u8>, acker: Arc<dyn DeliveryAcker>) -> Self {
        Self {
            delivery_tag,
            body,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack(self.delivery_tag).await
    }

    pub async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.reject(self.delivery_tag, requeue).await
    }
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}
