#![allow(dead_code)]

use integration_test_utils::{
    init_logging, FixedLookup, InMemoryBroker, RecordingAuditSink, ScriptedForwarder,
};
use mq_bridge::{Bridge, BridgeConfig, SubscriptionConfig};
use std::sync::Arc;

pub const BROKER_URL: &str = "memory://bridge-tests";

pub struct Harness {
    pub bridge: Bridge,
    pub broker: InMemoryBroker,
    pub lookup: Arc<FixedLookup>,
    pub forwarder: Arc<ScriptedForwarder>,
    pub audit: Arc<RecordingAuditSink>,
}

pub fn orders() -> SubscriptionConfig {
    SubscriptionConfig::new("orders-1", "orders", "https://hook.example/x", "s3cret")
}

pub fn billing() -> SubscriptionConfig {
    SubscriptionConfig::new("billing-1", "billing", "https://hook.example/billing", "")
}

pub fn config(reconnect_interval_ms: u64, refresh_retry_interval_ms: u64) -> BridgeConfig {
    BridgeConfig {
        broker_url: BROKER_URL.to_string(),
        reconnect_interval_ms,
        refresh_retry_interval_ms,
    }
}

pub async fn harness(config: BridgeConfig, subscriptions: Vec<SubscriptionConfig>) -> Harness {
    init_logging();

    let broker = InMemoryBroker::new();
    let lookup = Arc::new(FixedLookup::new(subscriptions));
    let forwarder = Arc::new(ScriptedForwarder::default());
    let audit = Arc::new(RecordingAuditSink::default());

    let bridge = Bridge::connect(
        &config,
        Arc::new(broker.clone()),
        lookup.clone(),
        forwarder.clone(),
        audit.clone(),
    )
    .await
    .expect("in-memory broker is reachable");

    Harness {
        bridge,
        broker,
        lookup,
        forwarder,
        audit,
    }
}
