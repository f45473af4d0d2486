//! Broker living in process memory, with hooks for injecting failures.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use mq_bridge::{
    Broker, BrokerChannel, BrokerConnection, BrokerError, CloseNotification, ConsumeOptions,
    Delivery, DeliveryAcker, DeliveryStream,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{oneshot, watch};
use tracing::debug;

/// How a delivery was finally settled by the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Acked {
        queue: String,
        body: Vec<u8>,
    },
    Rejected {
        queue: String,
        body: Vec<u8>,
        requeue: bool,
    },
}

#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    reachable: AtomicBool,
    dials: AtomicUsize,
    next_id: AtomicU64,
    next_tag: AtomicU64,
    // lock order: queues before in_flight
    queues: Mutex<HashMap<String, QueueState>>,
    in_flight: Mutex<HashMap<u64, InFlight>>,
    settlements: Mutex<Vec<Settlement>>,
    consume_refusals: Mutex<HashMap<String, usize>>,
    consume_options: Mutex<Vec<ConsumeOptions>>,
    connections: Mutex<Vec<Weak<ConnectionCore>>>,
    open_gate: Mutex<Option<Arc<GateState>>>,
}

struct GateState {
    waiting: AtomicUsize,
    released: watch::Sender<bool>,
}

/// Holds every `open_channel` call until released.
pub struct OpenChannelGate {
    state: Arc<GateState>,
    broker: Arc<BrokerInner>,
}

impl OpenChannelGate {
    /// Calls currently held at the gate.
    pub fn waiting(&self) -> usize {
        self.state.waiting.load(Ordering::SeqCst)
    }

    /// Lets held and future `open_channel` calls through.
    pub fn release(self) {
        self.broker.open_gate.lock().expect("lock open_gate").take();
        self.state.released.send_replace(true);
    }
}

struct InFlight {
    queue: String,
    body: Vec<u8>,
    channel_id: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Vec<u8>>,
    consumer: Option<Consumer>,
}

struct Consumer {
    consumer_tag: String,
    channel: Arc<ChannelCore>,
    tx: mpsc::UnboundedSender<Delivery>,
}

struct CloseSignals {
    open: bool,
    senders: Vec<oneshot::Sender<BrokerError>>,
}

impl CloseSignals {
    fn new() -> Self {
        Self {
            open: true,
            senders: Vec::new(),
        }
    }

    fn subscribe(&mut self) -> CloseNotification {
        let (tx, rx) = oneshot::channel();
        if self.open {
            self.senders.push(tx);
        }
        rx
    }

    /// Graceful closes drop the senders, unexpected ones deliver `reason`.
    fn close(&mut self, reason: Option<&BrokerError>) -> bool {
        if !self.open {
            return false;
        }
        self.open = false;
        for tx in self.senders.drain(..) {
            if let Some(reason) = reason {
                let _ = tx.send(reason.clone());
            }
        }
        true
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                reachable: AtomicBool::new(true),
                dials: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                next_tag: AtomicU64::new(1),
                queues: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                settlements: Mutex::new(Vec::new()),
                consume_refusals: Mutex::new(HashMap::new()),
                consume_options: Mutex::new(Vec::new()),
                connections: Mutex::new(Vec::new()),
                open_gate: Mutex::new(None),
            }),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn dial_count(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }

    /// Publishes `body` to `queue`, delivering right away if a consumer exists.
    pub fn publish(&self, queue: &str, body: impl Into<Vec<u8>>) {
        let mut queues = self.inner.queues.lock().expect("lock queues");
        let state = queues.entry(queue.to_string()).or_default();
        state.pending.push_back(body.into());
        self.inner.dispatch_pending(queue, state);
    }

    /// Makes the next `times` consume requests on `queue` fail.
    pub fn refuse_consume(&self, queue: &str, times: usize) {
        self.inner
            .consume_refusals
            .lock()
            .expect("lock consume_refusals")
            .insert(queue.to_string(), times);
    }

    /// Closes every live connection, and with it every channel, unexpectedly.
    pub fn drop_connections(&self) {
        let connections: Vec<Arc<ConnectionCore>> = self
            .inner
            .connections
            .lock()
            .expect("lock connections")
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for connection in connections {
            connection.shutdown(&BrokerError::ConnectionClosed(
                "connection reset by broker".to_string(),
            ));
        }
    }

    /// Closes, unexpectedly, the channel consuming with `consumer_tag`.
    pub fn kill_consumer_channel(&self, consumer_tag: &str) -> bool {
        let channel = {
            let queues = self.inner.queues.lock().expect("lock queues");
            queues
                .values()
                .filter_map(|state| state.consumer.as_ref())
                .find(|consumer| consumer.consumer_tag == consumer_tag)
                .map(|consumer| consumer.channel.clone())
        };
        match channel {
            Some(channel) => channel.shutdown(Some(&BrokerError::ChannelClosed(
                "channel killed by broker".to_string(),
            ))),
            None => false,
        }
    }

    /// Holds `open_channel` calls until the returned gate is released.
    pub fn hold_channel_opens(&self) -> OpenChannelGate {
        let (released, _) = watch::channel(false);
        let state = Arc::new(GateState {
            waiting: AtomicUsize::new(0),
            released,
        });
        *self.inner.open_gate.lock().expect("lock open_gate") = Some(state.clone());
        OpenChannelGate {
            state,
            broker: self.inner.clone(),
        }
    }

    pub fn consumer_tag(&self, queue: &str) -> Option<String> {
        self.inner
            .queues
            .lock()
            .expect("lock queues")
            .get(queue)
            .and_then(|state| state.consumer.as_ref())
            .map(|consumer| consumer.consumer_tag.clone())
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.inner
            .queues
            .lock()
            .expect("lock queues")
            .get(queue)
            .map_or(0, |state| state.pending.len())
    }

    /// Channels still open across all live connections.
    pub fn open_channel_count(&self) -> usize {
        self.inner
            .connections
            .lock()
            .expect("lock connections")
            .iter()
            .filter_map(Weak::upgrade)
            .map(|connection| connection.open_channel_count())
            .sum()
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.inner
            .settlements
            .lock()
            .expect("lock settlements")
            .clone()
    }

    pub fn consume_options(&self) -> Vec<ConsumeOptions> {
        self.inner
            .consume_options
            .lock()
            .expect("lock consume_options")
            .clone()
    }
}

impl BrokerInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn dispatch_pending(&self, queue: &str, state: &mut QueueState) {
        while let Some(consumer) = state.consumer.as_ref() {
            let Some(body) = state.pending.pop_front() else {
                return;
            };
            let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
            self.in_flight.lock().expect("lock in_flight").insert(
                tag,
                InFlight {
                    queue: queue.to_string(),
                    body: body.clone(),
                    channel_id: consumer.channel.id,
                },
            );
            let acker: Arc<dyn DeliveryAcker> = consumer.channel.clone();
            if let Err(err) = consumer.tx.unbounded_send(Delivery::new(tag, body, acker)) {
                self.in_flight.lock().expect("lock in_flight").remove(&tag);
                state.pending.push_front(err.into_inner().body);
                state.consumer = None;
            }
        }
    }

    fn settle(&self, tag: u64, outcome: Option<bool>) -> Result<(), BrokerError> {
        let entry = self
            .in_flight
            .lock()
            .expect("lock in_flight")
            .remove(&tag)
            .ok_or_else(|| BrokerError::Acknowledgement {
                delivery_tag: tag,
                reason: "unknown delivery tag".to_string(),
            })?;

        let settlement = match outcome {
            None => Settlement::Acked {
                queue: entry.queue,
                body: entry.body,
            },
            Some(requeue) => {
                if requeue {
                    let mut queues = self.queues.lock().expect("lock queues");
                    let state = queues.entry(entry.queue.clone()).or_default();
                    state.pending.push_back(entry.body.clone());
                    self.dispatch_pending(&entry.queue, state);
                }
                Settlement::Rejected {
                    queue: entry.queue,
                    body: entry.body,
                    requeue,
                }
            }
        };
        self.settlements
            .lock()
            .expect("lock settlements")
            .push(settlement);
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn dial(&self, address: &str) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let core = Arc::new(ConnectionCore {
            id: self.inner.next_id(),
            broker: self.inner.clone(),
            signals: Mutex::new(CloseSignals::new()),
            channels: Mutex::new(Vec::new()),
        });
        self.inner
            .connections
            .lock()
            .expect("lock connections")
            .push(Arc::downgrade(&core));
        debug!(connection = core.id, address, "in-memory connection opened");
        Ok(Arc::new(InMemoryConnection { core }))
    }
}

struct ConnectionCore {
    id: u64,
    broker: Arc<BrokerInner>,
    signals: Mutex<CloseSignals>,
    channels: Mutex<Vec<Arc<ChannelCore>>>,
}

impl ConnectionCore {
    fn is_open(&self) -> bool {
        self.signals.lock().expect("lock signals").open
    }

    fn shutdown(&self, reason: &BrokerError) {
        if !self.signals.lock().expect("lock signals").close(Some(reason)) {
            return;
        }
        let channels: Vec<Arc<ChannelCore>> =
            self.channels.lock().expect("lock channels").drain(..).collect();
        for channel in channels {
            channel.shutdown(Some(&BrokerError::ChannelClosed(format!(
                "connection {} closed",
                self.id
            ))));
        }
    }

    fn open_channel_count(&self) -> usize {
        self.channels
            .lock()
            .expect("lock channels")
            .iter()
            .filter(|channel| channel.is_open())
            .count()
    }
}

pub struct InMemoryConnection {
    core: Arc<ConnectionCore>,
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let gate = self.core.broker.open_gate.lock().expect("lock open_gate").clone();
        if let Some(gate) = gate {
            let mut released = gate.released.subscribe();
            gate.waiting.fetch_add(1, Ordering::SeqCst);
            let passed = released.wait_for(|released| *released).await.is_ok();
            gate.waiting.fetch_sub(1, Ordering::SeqCst);
            debug!(passed, "open_channel released from gate");
        }

        if !self.core.is_open() {
            return Err(BrokerError::ConnectionClosed(format!(
                "connection {} is closed",
                self.core.id
            )));
        }
        let channel = Arc::new(ChannelCore {
            id: self.core.broker.next_id(),
            broker: self.core.broker.clone(),
            signals: Mutex::new(CloseSignals::new()),
        });
        self.core
            .channels
            .lock()
            .expect("lock channels")
            .push(channel.clone());
        Ok(Arc::new(InMemoryChannel { core: channel }))
    }

    fn notify_close(&self) -> CloseNotification {
        self.core.signals.lock().expect("lock signals").subscribe()
    }
}

struct ChannelCore {
    id: u64,
    broker: Arc<BrokerInner>,
    signals: Mutex<CloseSignals>,
}

impl ChannelCore {
    fn is_open(&self) -> bool {
        self.signals.lock().expect("lock signals").open
    }

    /// Ends this channel's consumers and puts its unsettled deliveries back.
    fn shutdown(&self, reason: Option<&BrokerError>) -> bool {
        if !self.signals.lock().expect("lock signals").close(reason) {
            return false;
        }

        let mut queues = self.broker.queues.lock().expect("lock queues");
        for state in queues.values_mut() {
            if state
                .consumer
                .as_ref()
                .map_or(false, |consumer| consumer.channel.id == self.id)
            {
                state.consumer = None;
            }
        }

        let mut in_flight = self.broker.in_flight.lock().expect("lock in_flight");
        let mut unsettled: Vec<(u64, InFlight)> = Vec::new();
        in_flight.retain(|tag, entry| {
            if entry.channel_id == self.id {
                unsettled.push((
                    *tag,
                    InFlight {
                        queue: entry.queue.clone(),
                        body: entry.body.clone(),
                        channel_id: entry.channel_id,
                    },
                ));
                false
            } else {
                true
            }
        });
        drop(in_flight);

        unsettled.sort_by_key(|(tag, _)| *tag);
        for (_, entry) in unsettled.into_iter().rev() {
            queues
                .entry(entry.queue)
                .or_default()
                .pending
                .push_front(entry.body);
        }
        true
    }
}

#[async_trait]
impl DeliveryAcker for ChannelCore {
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::Acknowledgement {
                delivery_tag,
                reason: "channel closed".to_string(),
            });
        }
        self.broker.settle(delivery_tag, None)
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::Acknowledgement {
                delivery_tag,
                reason: "channel closed".to_string(),
            });
        }
        self.broker.settle(delivery_tag, Some(requeue))
    }
}

pub struct InMemoryChannel {
    core: Arc<ChannelCore>,
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, BrokerError> {
        if !self.core.is_open() {
            return Err(BrokerError::ChannelClosed(format!(
                "channel {} is closed",
                self.core.id
            )));
        }
        self.core
            .broker
            .consume_options
            .lock()
            .expect("lock consume_options")
            .push(options);

        {
            let mut refusals = self
                .core
                .broker
                .consume_refusals
                .lock()
                .expect("lock consume_refusals");
            if let Some(remaining) = refusals.get_mut(queue) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BrokerError::ConsumeRefused {
                        queue: queue.to_string(),
                        reason: "refused by broker".to_string(),
                    });
                }
            }
        }

        let (tx, rx) = mpsc::unbounded();
        let mut queues = self.core.broker.queues.lock().expect("lock queues");
        let state = queues.entry(queue.to_string()).or_default();
        state.consumer = Some(Consumer {
            consumer_tag: consumer_tag.to_string(),
            channel: self.core.clone(),
            tx,
        });
        self.core.broker.dispatch_pending(queue, state);
        Ok(rx.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.core.shutdown(None) {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed(format!(
                "channel {} already closed",
                self.core.id
            )))
        }
    }

    fn notify_close(&self) -> CloseNotification {
        self.core.signals.lock().expect("lock signals").subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryBroker, Settlement};
    use futures::StreamExt;
    use mq_bridge::{Broker, BrokerChannel, BrokerConnection, ConsumeOptions};

    #[tokio::test]
    async fn published_messages_reach_the_consumer_and_settle() {
        let broker = InMemoryBroker::new();
        broker.publish("orders", b"first".to_vec());

        let connection = broker.dial("memory://").await.expect("dial");
        let channel = connection.open_channel().await.expect("channel");
        let mut deliveries = channel
            .consume("orders", "orders-1", ConsumeOptions::manual_ack())
            .await
            .expect("consume");
        broker.publish("orders", b"second".to_vec());

        let first = deliveries.next().await.expect("first delivery");
        let second = deliveries.next().await.expect("second delivery");
        first.ack().await.expect("ack");
        second.reject(false).await.expect("reject");

        assert_eq!(
            broker.settlements(),
            vec![
                Settlement::Acked {
                    queue: "orders".to_string(),
                    body: b"first".to_vec()
                },
                Settlement::Rejected {
                    queue: "orders".to_string(),
                    body: b"second".to_vec(),
                    requeue: false
                },
            ]
        );
        assert_eq!(broker.consumer_tag("orders").as_deref(), Some("orders-1"));
    }

    #[tokio::test]
    async fn killing_a_channel_ends_its_stream_and_requeues_unsettled() {
        let broker = InMemoryBroker::new();
        let connection = broker.dial("memory://").await.expect("dial");
        let channel = connection.open_channel().await.expect("channel");
        let close = channel.notify_close();
        let mut deliveries = channel
            .consume("orders", "orders-1", ConsumeOptions::manual_ack())
            .await
            .expect("consume");
        broker.publish("orders", b"unsettled".to_vec());
        let delivery = deliveries.next().await.expect("delivery");

        assert!(broker.kill_consumer_channel("orders-1"));

        assert!(close.await.is_ok());
        assert!(deliveries.next().await.is_none());
        assert!(delivery.ack().await.is_err());
        assert_eq!(broker.pending("orders"), 1);
        assert_eq!(broker.open_channel_count(), 0);
    }

    #[tokio::test]
    async fn graceful_close_drops_the_close_notification() {
        let broker = InMemoryBroker::new();
        let connection = broker.dial("memory://").await.expect("dial");
        let channel = connection.open_channel().await.expect("channel");
        let close = channel.notify_close();

        channel.close().await.expect("first close");

        assert!(close.await.is_err());
        assert!(channel.close().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_broker_refuses_dials() {
        let broker = InMemoryBroker::new();
        broker.set_reachable(false);
        assert!(broker.dial("memory://").await.is_err());
        assert_eq!(broker.dial_count(), 1);
    }
}
