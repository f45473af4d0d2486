//! Establishes consumption for one identity and spawns its per-message loop.

use crate::bridge::BridgeShared;
use crate::broker::ConsumeOptions;
use crate::data_plane::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::observability::events;
use crate::subscription::SubscriptionConfig;
use tracing::{info, warn};

const COMPONENT: &str = "consumer";

/// Starts consuming `config.queue` on the identity's current channel.
///
/// Failure clears the identity's readiness flag; success sets it.
pub(crate) async fn start_consuming(
    shared: &BridgeShared,
    config: SubscriptionConfig,
) -> Result<(), BridgeError> {
    let generation = shared.registry.generation(&config.identity);
    start_consuming_in(shared, config, generation).await
}

/// As [`start_consuming`], but only if no teardown happened since `generation`.
///
/// A consumer established after a teardown is discarded and readiness is left
/// cleared.
pub(crate) async fn start_consuming_in(
    shared: &BridgeShared,
    config: SubscriptionConfig,
    generation: u64,
) -> Result<(), BridgeError> {
    let identity = config.identity.clone();

    let Some(channel) = shared.registry.channel(&identity) else {
        shared.registry.set_ready(&identity, false);
        warn!(
            event = events::CONSUME_FAILED,
            component = COMPONENT,
            identity = %identity,
            reason = "no_channel",
            "no channel to consume on"
        );
        return Err(BridgeError::ChannelNotFound(identity));
    };

    let deliveries = match channel
        .consume(&config.queue, &identity, ConsumeOptions::manual_ack())
        .await
    {
        Ok(deliveries) => deliveries,
        Err(err) => {
            shared.registry.set_ready(&identity, false);
            warn!(
                event = events::CONSUME_FAILED,
                component = COMPONENT,
                identity = %identity,
                queue = %config.queue,
                err = %err,
                "unable to start consuming"
            );
            return Err(BridgeError::channel(&identity, err));
        }
    };

    if !shared.registry.mark_ready(&identity, generation) {
        warn!(
            event = events::CONSUME_FAILED,
            component = COMPONENT,
            identity = %identity,
            queue = %config.queue,
            reason = "torn_down",
            "identity was torn down while consumption was starting"
        );
        return Err(BridgeError::TornDown(identity));
    }

    info!(
        event = events::CONSUME_STARTED,
        component = COMPONENT,
        identity = %identity,
        queue = %config.queue,
        "consuming"
    );

    let dispatcher = Dispatcher::new(config, shared.forwarder.clone(), shared.audit.clone());
    tokio::spawn(dispatcher.run(deliveries));
    Ok(())
}
