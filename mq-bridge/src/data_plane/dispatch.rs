//! Per-message loop that forwards deliveries to the subscription's webhook.

use crate::audit::{AuditRecord, AuditSink, MessageEnvelope};
use crate::broker::{BrokerError, Delivery, DeliveryStream};
use crate::data_plane::response_capture::{capture_response, CapturedResponse};
use crate::observability::{events, fields};
use crate::subscription::SubscriptionConfig;
use crate::webhook::{ForwardRequest, WebhookForwarder};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "dispatch";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// Forwarded successfully and acknowledged.
    Acked,
    /// Forwarding failed; rejected without requeue and audited.
    Rejected,
    /// Body was not JSON; rejected without requeue, no audit record.
    Malformed,
    /// Forwarded and audited, but the ack or reject did not reach the broker.
    /// The broker may deliver the message again.
    Unsettled,
}

pub(crate) struct Dispatcher {
    config: SubscriptionConfig,
    forwarder: Arc<dyn WebhookForwarder>,
    audit: Arc<dyn AuditSink>,
}

impl Dispatcher {
    pub(crate) fn new(
        config: SubscriptionConfig,
        forwarder: Arc<dyn WebhookForwarder>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            forwarder,
            audit,
        }
    }

    /// Handles deliveries in arrival order until the stream ends.
    pub(crate) async fn run(self, mut deliveries: DeliveryStream) {
        while let Some(delivery) = deliveries.next().await {
            self.dispatch(&delivery).await;
        }
        debug!(
            event = events::CONSUME_STREAM_ENDED,
            component = COMPONENT,
            identity = %self.config.identity,
            "delivery stream ended"
        );
    }

    pub(crate) async fn dispatch(&self, delivery: &Delivery) -> DispatchOutcome {
        let identity = self.config.identity.as_str();
        debug!(
            event = events::DELIVERY_RECEIVED,
            component = COMPONENT,
            identity,
            delivery_tag = delivery.delivery_tag,
            body = %fields::format_body_preview(&delivery.body),
            "received delivery"
        );

        let body: Value = match serde_json::from_slice(&delivery.body) {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    event = events::DELIVERY_MALFORMED,
                    component = COMPONENT,
                    identity,
                    delivery_tag = delivery.delivery_tag,
                    err = %err,
                    "rejecting delivery with malformed body"
                );
                self.settle(delivery, delivery.reject(false).await);
                return DispatchOutcome::Malformed;
            }
        };

        let response = self
            .forwarder
            .forward(ForwardRequest {
                url: self.config.url.clone(),
                secret: self.config.secret.clone(),
                body: delivery.body.clone(),
            })
            .await;
        let has_error = response.has_errors();

        let (status, captured, outcome) = if has_error {
            warn!(
                event = events::DELIVERY_FORWARD_FAILED,
                component = COMPONENT,
                identity,
                delivery_tag = delivery.delivery_tag,
                url = %self.config.url,
                errors = %fields::format_forward_errors(&response.errors),
                "webhook forwarding failed"
            );
            let errs: Vec<String> = response.errors.iter().map(ToString::to_string).collect();
            let outcome = if self.settle(delivery, delivery.reject(false).await) {
                DispatchOutcome::Rejected
            } else {
                DispatchOutcome::Unsettled
            };
            (false, json!({ "errs": errs }), outcome)
        } else {
            let captured = match capture_response(&response.body) {
                CapturedResponse::Structured(value) => value,
                raw @ CapturedResponse::Raw(_) => {
                    debug!(
                        event = events::DELIVERY_RESPONSE_RAW,
                        component = COMPONENT,
                        identity,
                        delivery_tag = delivery.delivery_tag,
                        "webhook response is not a JSON object, keeping raw text"
                    );
                    raw.into_value()
                }
            };
            let outcome = if self.settle(delivery, delivery.ack().await) {
                DispatchOutcome::Acked
            } else {
                DispatchOutcome::Unsettled
            };
            (true, captured, outcome)
        };

        self.audit.push(AuditRecord {
            identity: self.config.identity.clone(),
            has_error,
            envelope: MessageEnvelope {
                identity: self.config.identity.clone(),
                queue: self.config.queue.clone(),
                url: self.config.url.clone(),
                secret: self.config.secret.clone(),
                body,
                status,
                response: captured,
                time: chrono::Utc::now().timestamp(),
            },
        });

        outcome
    }

    /// Logs a failed ack or reject. Returns whether the broker took it.
    fn settle(&self, delivery: &Delivery, result: Result<(), BrokerError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    event = events::DELIVERY_SETTLE_FAILED,
                    component = COMPONENT,
                    identity = %self.config.identity,
                    delivery_tag = delivery.delivery_tag,
                    settle_failed = true,
                    err = %err,
                    "unable to settle delivery, it may be redelivered"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DispatchOutcome, Dispatcher};
    use crate::audit::{AuditRecord, AuditSink};
    use crate::broker::{BrokerError, Delivery, DeliveryAcker};
    use crate::subscription::SubscriptionConfig;
    use crate::webhook::{ForwardError, ForwardRequest, ForwardResponse, WebhookForwarder};
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Settlement {
        Ack(u64),
        Reject { tag: u64, requeue: bool },
    }

    #[derive(Default)]
    struct RecordingAcker {
        settlements: Mutex<Vec<Settlement>>,
        channel_closed: bool,
    }

    #[async_trait]
    impl DeliveryAcker for RecordingAcker {
        async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
            if self.channel_closed {
                return Err(BrokerError::Acknowledgement {
                    delivery_tag,
                    reason: "channel closed".to_string(),
                });
            }
            self.settlements
                .lock()
                .expect("lock settlements")
                .push(Settlement::Ack(delivery_tag));
            Ok(())
        }

        async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
            self.settlements
                .lock()
                .expect("lock settlements")
                .push(Settlement::Reject {
                    tag: delivery_tag,
                    requeue,
                });
            Ok(())
        }
    }

    struct CannedForwarder {
        response: ForwardResponse,
        requests: Mutex<Vec<ForwardRequest>>,
    }

    impl CannedForwarder {
        fn new(response: ForwardResponse) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WebhookForwarder for CannedForwarder {
        async fn forward(&self, request: ForwardRequest) -> ForwardResponse {
            self.requests.lock().expect("lock requests").push(request);
            self.response.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<AuditRecord>>,
    }

    impl AuditSink for RecordingSink {
        fn push(&self, record: AuditRecord) {
            self.records.lock().expect("lock records").push(record);
        }
    }

    struct Harness {
        acker: Arc<RecordingAcker>,
        forwarder: Arc<CannedForwarder>,
        sink: Arc<RecordingSink>,
        dispatcher: Dispatcher,
    }

    fn harness(response: ForwardResponse) -> Harness {
        let acker = Arc::new(RecordingAcker::default());
        let forwarder = Arc::new(CannedForwarder::new(response));
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(
            SubscriptionConfig::new("orders-1", "orders", "https://hook.example/x", "s3cret"),
            forwarder.clone(),
            sink.clone(),
        );
        Harness {
            acker,
            forwarder,
            sink,
            dispatcher,
        }
    }

    impl Harness {
        fn delivery(&self, tag: u64, body: &[u8]) -> Delivery {
            Delivery::new(tag, body.to_vec(), self.acker.clone())
        }

        fn settlements(&self) -> Vec<Settlement> {
            self.acker.settlements.lock().expect("lock settlements").clone()
        }

        fn records(&self) -> Vec<AuditRecord> {
            self.sink.records.lock().expect("lock records").clone()
        }
    }

    #[tokio::test]
    async fn successful_forward_with_object_response_is_acked_and_audited() {
        let h = harness(ForwardResponse::ok(br#"{"ok":true}"#.to_vec()));

        let outcome = h.dispatcher.dispatch(&h.delivery(1, br#"{"id":1}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Acked);
        assert_eq!(h.settlements(), vec![Settlement::Ack(1)]);

        let requests = h.forwarder.requests.lock().expect("lock requests").clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://hook.example/x");
        assert_eq!(requests[0].secret, "s3cret");
        assert_eq!(requests[0].body, br#"{"id":1}"#.to_vec());

        let records = h.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.identity, "orders-1");
        assert!(!record.has_error);
        assert!(record.envelope.status);
        assert_eq!(record.envelope.queue, "orders");
        assert_eq!(record.envelope.body, json!({"id": 1}));
        assert_eq!(record.envelope.response, json!({"ok": true}));
        assert!(record.envelope.time > 0);
    }

    #[tokio::test]
    async fn successful_forward_with_non_object_response_keeps_raw_text() {
        let h = harness(ForwardResponse::ok(b"accepted".to_vec()));

        let outcome = h.dispatcher.dispatch(&h.delivery(4, br#"{"id":4}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Acked);
        assert_eq!(h.settlements(), vec![Settlement::Ack(4)]);
        let records = h.records();
        assert!(records[0].envelope.status);
        assert_eq!(records[0].envelope.response, json!({"raw": "accepted"}));
    }

    #[tokio::test]
    async fn forward_errors_reject_without_requeue_and_record_errs() {
        let h = harness(ForwardResponse::failed(vec![
            ForwardError::Status { status: 503 },
            ForwardError::Other("gave up".to_string()),
        ]));

        let outcome = h.dispatcher.dispatch(&h.delivery(2, br#"{"id":2}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Rejected);
        assert_eq!(
            h.settlements(),
            vec![Settlement::Reject {
                tag: 2,
                requeue: false
            }]
        );
        let records = h.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].has_error);
        assert!(!records[0].envelope.status);
        assert_eq!(
            records[0].envelope.response,
            json!({"errs": ["webhook responded with HTTP 503", "gave up"]})
        );
    }

    #[tokio::test]
    async fn failed_ack_is_reported_as_unsettled() {
        let mut h = harness(ForwardResponse::ok(br#"{"ok":true}"#.to_vec()));
        h.acker = Arc::new(RecordingAcker {
            channel_closed: true,
            ..Default::default()
        });

        let outcome = h.dispatcher.dispatch(&h.delivery(5, br#"{"id":5}"#)).await;

        assert_eq!(outcome, DispatchOutcome::Unsettled);
        assert!(h.settlements().is_empty());
        // the webhook did receive it, so the forward is still audited
        let records = h.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].envelope.status);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_without_forwarding_or_audit() {
        let h = harness(ForwardResponse::ok(b"{}".to_vec()));

        let outcome = h.dispatcher.dispatch(&h.delivery(3, b"not json")).await;

        assert_eq!(outcome, DispatchOutcome::Malformed);
        assert_eq!(
            h.settlements(),
            vec![Settlement::Reject {
                tag: 3,
                requeue: false
            }]
        );
        assert!(h.forwarder.requests.lock().expect("lock requests").is_empty());
        assert!(h.records().is_empty());
    }

    #[tokio::test]
    async fn run_keeps_consuming_after_a_malformed_body() {
        let h = harness(ForwardResponse::ok(b"{}".to_vec()));
        let deliveries = vec![
            h.delivery(1, br#"{"id":1}"#),
            h.delivery(2, b"{broken"),
            h.delivery(3, br#"{"id":3}"#),
        ];
        let Harness {
            acker,
            sink,
            dispatcher,
            ..
        } = h;

        dispatcher.run(Box::pin(stream::iter(deliveries))).await;

        assert_eq!(
            *acker.settlements.lock().expect("lock settlements"),
            vec![
                Settlement::Ack(1),
                Settlement::Reject {
                    tag: 2,
                    requeue: false
                },
                Settlement::Ack(3),
            ]
        );
        let records = sink.records.lock().expect("lock records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].envelope.body, json!({"id": 3}));
    }
}
