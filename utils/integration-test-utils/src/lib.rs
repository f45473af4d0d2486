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

//! Test doubles for exercising `mq-bridge` end to end without a real broker
//! or HTTP endpoint.

mod collaborators;
mod in_memory_broker;

pub use collaborators::{FixedLookup, RecordingAuditSink, ScriptedForwarder};
pub use in_memory_broker::{InMemoryBroker, OpenChannelGate, Settlement};

use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber once per test binary. `RUST_LOG` applies.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

const EVENTUALLY_POLL: Duration = Duration::from_millis(10);
const EVENTUALLY_ROUNDS: usize = 1_000;

/// Polls `condition` until it holds, panicking with `what` if it never does.
///
/// Works with both real and paused tokio clocks.
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..EVENTUALLY_ROUNDS {
        if condition() {
            return;
        }
        tokio::time::sleep(EVENTUALLY_POLL).await;
    }
    panic!("condition never held: {what}");
}
