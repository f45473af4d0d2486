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

use async_trait::async_trait;
use mq_bridge::{LookupError, SubscriptionConfig, SubscriptionLookup};
use serde::Deserialize;
use serde_json::Value;
use std::fs::{self, canonicalize};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct StaticEntry {
    queue: String,
    url: String,
    #[serde(default)]
    secret: String,
}

/// Read-only subscription store backed by a JSON file.
///
/// The file maps identities to `{ "queue", "url", "secret" }` objects and is
/// re-read on every lookup, so edits are picked up by the next channel refresh.
pub struct SubscriptionStaticFile {
    static_file: String,
}

impl SubscriptionStaticFile {
    pub fn new(static_file: String) -> Self {
        Self { static_file }
    }

    fn canonicalized_static_file_path(&self) -> Result<PathBuf, LookupError> {
        let subscription_json_file = PathBuf::from(self.static_file.clone());
        debug!("subscription_json_file: {subscription_json_file:?}");

        canonicalize(subscription_json_file).map_err(|error| {
            LookupError::Unavailable(format!("Static subscription file not found: {error:?}"))
        })
    }

    fn read_static_config_json(&self) -> Result<Value, LookupError> {
        let subscription_json_file = self.canonicalized_static_file_path()?;
        let data = fs::read_to_string(subscription_json_file).map_err(|error| {
            LookupError::Unavailable(format!("Unable to read file: {error:?}"))
        })?;

        serde_json::from_str(&data)
            .map_err(|error| LookupError::Unavailable(format!("Unable to parse JSON: {error:?}")))
    }

    /// All well-formed entries in the file. Malformed entries are skipped.
    pub fn subscriptions(&self) -> Result<Vec<SubscriptionConfig>, LookupError> {
        let value = self.read_static_config_json()?;
        let Some(entries) = value.as_object() else {
            return Err(LookupError::Unavailable(
                "Static subscription file must be a JSON object mapping identities to subscription objects"
                    .to_string(),
            ));
        };

        let mut subscriptions = Vec::with_capacity(entries.len());
        for (identity, entry) in entries {
            match serde_json::from_value::<StaticEntry>(entry.clone()) {
                Ok(entry) => subscriptions.push(SubscriptionConfig {
                    identity: identity.clone(),
                    queue: entry.queue,
                    url: entry.url,
                    secret: entry.secret,
                }),
                Err(error) => {
                    warn!("Ignoring malformed subscription '{identity}': {error}");
                }
            }
        }
        Ok(subscriptions)
    }
}

#[async_trait]
impl SubscriptionLookup for SubscriptionStaticFile {
    async fn subscription_config(&self, identity: &str) -> Result<SubscriptionConfig, LookupError> {
        self.subscriptions()?
            .into_iter()
            .find(|config| config.identity == identity)
            .ok_or_else(|| LookupError::UnknownIdentity(identity.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriptionStaticFile;
    use mq_bridge::{LookupError, SubscriptionConfig, SubscriptionLookup};
    use std::io::Write;

    fn static_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{contents}").expect("write static file");
        file
    }

    #[tokio::test]
    async fn looks_up_identity_from_testdata() {
        let lookup = SubscriptionStaticFile::new(format!(
            "{}/static-configs/testdata.json",
            env!("CARGO_MANIFEST_DIR")
        ));

        let config = lookup
            .subscription_config("orders-1")
            .await
            .expect("orders-1 present");

        assert_eq!(
            config,
            SubscriptionConfig::new("orders-1", "orders", "https://hook.example/x", "s3cret")
        );

        let billing = lookup
            .subscription_config("billing-1")
            .await
            .expect("billing-1 present");
        assert_eq!(billing.secret, "");
    }

    #[tokio::test]
    async fn unknown_identity_is_reported() {
        let file = static_file(r#"{"orders-1": {"queue": "orders", "url": "http://x"}}"#);
        let lookup = SubscriptionStaticFile::new(file.path().display().to_string());

        assert_eq!(
            lookup.subscription_config("missing").await,
            Err(LookupError::UnknownIdentity("missing".to_string()))
        );
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let file = static_file(
            r#"{
                "good": {"queue": "q", "url": "http://x"},
                "no-url": {"queue": "q"},
                "not-an-object": 3
            }"#,
        );
        let lookup = SubscriptionStaticFile::new(file.path().display().to_string());

        let subscriptions = lookup.subscriptions().expect("file parses");
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].identity, "good");
    }

    #[test]
    fn missing_or_non_object_files_are_unavailable() {
        let lookup = SubscriptionStaticFile::new("/definitely/not/here.json".to_string());
        assert!(matches!(
            lookup.subscriptions(),
            Err(LookupError::Unavailable(_))
        ));

        let file = static_file("[1, 2, 3]");
        let lookup = SubscriptionStaticFile::new(file.path().display().to_string());
        assert!(matches!(
            lookup.subscriptions(),
            Err(LookupError::Unavailable(_))
        ));
    }
}
