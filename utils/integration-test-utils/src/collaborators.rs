//! Recording stand-ins for the lookup, webhook and audit collaborators.

use async_trait::async_trait;
use mq_bridge::{
    AuditRecord, AuditSink, ForwardRequest, ForwardResponse, LookupError, SubscriptionConfig,
    SubscriptionLookup, WebhookForwarder,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Subscription store held in memory; entries can change while a test runs.
#[derive(Default)]
pub struct FixedLookup {
    configs: Mutex<HashMap<String, SubscriptionConfig>>,
    lookups: Mutex<Vec<String>>,
}

impl FixedLookup {
    pub fn new(configs: impl IntoIterator<Item = SubscriptionConfig>) -> Self {
        let lookup = Self::default();
        for config in configs {
            lookup.insert(config);
        }
        lookup
    }

    pub fn insert(&self, config: SubscriptionConfig) {
        self.configs
            .lock()
            .expect("lock configs")
            .insert(config.identity.clone(), config);
    }

    pub fn remove(&self, identity: &str) {
        self.configs.lock().expect("lock configs").remove(identity);
    }

    /// Identities looked up so far, in call order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().expect("lock lookups").clone()
    }
}

#[async_trait]
impl SubscriptionLookup for FixedLookup {
    async fn subscription_config(&self, identity: &str) -> Result<SubscriptionConfig, LookupError> {
        self.lookups
            .lock()
            .expect("lock lookups")
            .push(identity.to_string());
        self.configs
            .lock()
            .expect("lock configs")
            .get(identity)
            .cloned()
            .ok_or_else(|| LookupError::UnknownIdentity(identity.to_string()))
    }
}

/// Replays queued responses, falling back to a default once they run out.
pub struct ScriptedForwarder {
    fallback: ForwardResponse,
    script: Mutex<VecDeque<ForwardResponse>>,
    requests: Mutex<Vec<ForwardRequest>>,
}

impl Default for ScriptedForwarder {
    fn default() -> Self {
        Self::new(ForwardResponse::ok(b"{}".to_vec()))
    }
}

impl ScriptedForwarder {
    pub fn new(fallback: ForwardResponse) -> Self {
        Self {
            fallback,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: ForwardResponse) {
        self.script.lock().expect("lock script").push_back(response);
    }

    pub fn requests(&self) -> Vec<ForwardRequest> {
        self.requests.lock().expect("lock requests").clone()
    }
}

#[async_trait]
impl WebhookForwarder for ScriptedForwarder {
    async fn forward(&self, request: ForwardRequest) -> ForwardResponse {
        self.requests.lock().expect("lock requests").push(request);
        self.script
            .lock()
            .expect("lock script")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("lock records").clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("lock records").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for RecordingAuditSink {
    fn push(&self, record: AuditRecord) {
        self.records.lock().expect("lock records").push(record);
    }
}
