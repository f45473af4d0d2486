use integration_test_utils::{
    eventually, init_logging, InMemoryBroker, RecordingAuditSink, ScriptedForwarder, Settlement,
};
use mq_bridge::{Bridge, BridgeConfig, BridgeError, LookupError};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use subscription_static_file::SubscriptionStaticFile;

fn write_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "{contents}").expect("write temp file");
    file
}

#[tokio::test]
async fn bridge_runs_from_config_and_subscription_files() {
    init_logging();

    let config_file = write_file(
        r#"{
            // local broker
            broker_url: "memory://static-file",
            reconnect_interval_ms: 250,
        }"#,
    );
    let subscriptions_file = write_file(
        r#"{
            "orders-1": {
                "queue": "orders",
                "url": "https://hook.example/x",
                "secret": "s3cret"
            }
        }"#,
    );

    let config = BridgeConfig::from_file(config_file.path()).expect("config loads");
    assert_eq!(config.broker_url, "memory://static-file");
    assert_eq!(config.refresh_retry_interval_ms, 0);

    let broker = InMemoryBroker::new();
    let audit = Arc::new(RecordingAuditSink::default());
    let bridge = Bridge::connect(
        &config,
        Arc::new(broker.clone()),
        Arc::new(SubscriptionStaticFile::new(
            subscriptions_file.path().display().to_string(),
        )),
        Arc::new(ScriptedForwarder::default()),
        audit.clone(),
    )
    .await
    .expect("connect");

    bridge.subscribe("orders-1").await.expect("subscribe");
    broker.publish("orders", br#"{"id":1}"#.to_vec());
    eventually("audit record", || audit.len() == 1).await;

    let record = &audit.records()[0];
    assert_eq!(record.envelope.url, "https://hook.example/x");
    assert_eq!(record.envelope.response, json!({}));
    assert!(matches!(broker.settlements()[0], Settlement::Acked { .. }));

    assert!(matches!(
        bridge.subscribe("unknown").await,
        Err(BridgeError::Lookup(LookupError::UnknownIdentity(_)))
    ));
}
