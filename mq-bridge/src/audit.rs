//! Audit records emitted once per forwarded delivery.

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

/// Audit shape of one consumed delivery.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageEnvelope {
    pub identity: String,
    pub queue: String,
    pub url: String,
    pub secret: String,
    pub body: Value,
    pub status: bool,
    pub response: Value,
    /// Unix seconds.
    pub time: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditRecord {
    pub identity: String,
    pub has_error: bool,
    pub envelope: MessageEnvelope,
}

/// Append-only destination for audit records. Fire-and-forget.
pub trait AuditSink: Send + Sync {
    fn push(&self, record: AuditRecord);
}

/// Writes every audit record as a structured `tracing` event.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn push(&self, record: AuditRecord) {
        let envelope = match serde_json::to_string(&record.envelope) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(
                    target: "mq_bridge::audit",
                    identity = %record.identity,
                    err = %err,
                    "unable to serialize audit envelope"
                );
                return;
            }
        };

        if record.has_error {
            error!(
                target: "mq_bridge::audit",
                identity = %record.identity,
                has_error = true,
                envelope = %envelope,
                "delivery forwarded with errors"
            );
        } else {
            info!(
                target: "mq_bridge::audit",
                identity = %record.identity,
                has_error = false,
                envelope = %envelope,
                "delivery forwarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MessageEnvelope;
    use serde_json::json;

    #[test]
    fn envelope_serializes_with_audit_field_names() {
        let envelope = MessageEnvelope {
            identity: "orders-1".to_string(),
            queue: "orders".to_string(),
            url: "https://hook.example/x".to_string(),
            secret: "s3cret".to_string(),
            body: json!({"id": 1}),
            status: true,
            response: json!({"ok": true}),
            time: 1_700_000_000,
        };

        let value = serde_json::to_value(&envelope).expect("serializable envelope");

        assert_eq!(
            value,
            json!({
                "Identity": "orders-1",
                "Queue": "orders",
                "Url": "https://hook.example/x",
                "Secret": "s3cret",
                "Body": {"id": 1},
                "Status": true,
                "Response": {"ok": true},
                "Time": 1_700_000_000,
            })
        );
    }
}
