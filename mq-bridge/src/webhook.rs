//! Outbound webhook contract used by the dispatch pipeline.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardRequest {
    pub url: String,
    pub secret: String,
    pub body: Vec<u8>,
}

/// Mechanism-level failure of a webhook call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ForwardError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("webhook responded with HTTP {status}")]
    Status { status: u16 },
    #[error("{0}")]
    Other(String),
}

/// Response payload plus one error per failure observed while forwarding.
///
/// `body` may be empty when `errors` is not.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardResponse {
    pub body: Vec<u8>,
    pub errors: Vec<ForwardError>,
}

impl ForwardResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<ForwardError>) -> Self {
        Self {
            body: Vec::new(),
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[async_trait]
pub trait WebhookForwarder: Send + Sync {
    async fn forward(&self, request: ForwardRequest) -> ForwardResponse;
}
