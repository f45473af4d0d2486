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

//! HTTP implementation of [`WebhookForwarder`].
//!
//! Each message body is POSTed as-is to the subscription URL. When the
//! subscription carries a secret, the request is signed:
//!
//! - `X-Webhook-Timestamp`: unix seconds at send time
//! - `X-Webhook-Signature`: `sha256=<hex(HMAC-SHA256(secret, "<timestamp>.<body>"))>`

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use mq_bridge::{ForwardError, ForwardRequest, ForwardResponse, WebhookForwarder};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("mq-bridge/", env!("CARGO_PKG_VERSION"));

const COMPONENT: &str = "webhook_http";

/// Hex-encoded HMAC-SHA256 over `"<timestamp>.<body>"`.
///
/// Returns `None` only if the MAC cannot be keyed, which HMAC never refuses.
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub struct HttpWebhookForwarder {
    client: Client,
}

impl HttpWebhookForwarder {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ForwardError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_defaults() -> Result<Self, ForwardError> {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    fn headers(&self, secret: &str, body: &[u8]) -> HeaderMap {
        let timestamp = Utc::now().timestamp().to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(v) = HeaderValue::from_str(&timestamp) {
            headers.insert(TIMESTAMP_HEADER, v);
        }

        if !secret.is_empty() {
            match compute_signature(secret, &timestamp, body) {
                Some(signature) => {
                    if let Ok(v) = HeaderValue::from_str(&format!("sha256={signature}")) {
                        headers.insert(SIGNATURE_HEADER, v);
                    }
                }
                None => warn!(
                    component = COMPONENT,
                    "unable to key signature, delivering unsigned"
                ),
            }
        }
        headers
    }
}

#[async_trait]
impl WebhookForwarder for HttpWebhookForwarder {
    async fn forward(&self, request: ForwardRequest) -> ForwardResponse {
        let headers = self.headers(&request.secret, &request.body);

        let result = self
            .client
            .post(&request.url)
            .headers(headers)
            .body(request.body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };
                return ForwardResponse::failed(vec![ForwardError::Transport {
                    url: request.url,
                    reason,
                }]);
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                return ForwardResponse::failed(vec![ForwardError::Transport {
                    url: request.url,
                    reason: format!("failed to read response body: {e}"),
                }]);
            }
        };
        debug!(
            component = COMPONENT,
            url = %request.url,
            status = status.as_u16(),
            "webhook responded"
        );

        if status.is_success() {
            ForwardResponse::ok(body)
        } else {
            ForwardResponse {
                body,
                errors: vec![ForwardError::Status {
                    status: status.as_u16(),
                }],
            }
        }
    }
}
