//! Subscription configuration records and the lookup service that owns them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where one identity consumes from and where its payloads go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub identity: String,
    pub queue: String,
    pub url: String,
    #[serde(default)]
    pub secret: String,
}

impl SubscriptionConfig {
    pub fn new(identity: &str, queue: &str, url: &str, secret: &str) -> Self {
        Self {
            identity: identity.to_string(),
            queue: queue.to_string(),
            url: url.to_string(),
            secret: secret.to_string(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no subscription registered for identity {0:?}")]
    UnknownIdentity(String),
    #[error("subscription store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the current configuration for a subscription identity.
#[async_trait]
pub trait SubscriptionLookup: Send + Sync {
    async fn subscription_config(&self, identity: &str) -> Result<SubscriptionConfig, LookupError>;
}
