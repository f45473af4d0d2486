//! Event names emitted by the bridge.

pub const CONNECTION_OPENED: &str = "connection_opened";
pub const CONNECTION_LOST: &str = "connection_lost";
pub const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
pub const RECONNECT_FAILED: &str = "reconnect_failed";
pub const RECONNECT_SUCCEEDED: &str = "reconnect_succeeded";

pub const CHANNEL_OPENED: &str = "channel_opened";
pub const CHANNEL_REPLACED: &str = "channel_replaced";
pub const CHANNEL_LOST: &str = "channel_lost";
pub const CHANNEL_RELEASED: &str = "channel_released";
pub const CHANNEL_CLOSED: &str = "channel_closed";
pub const CHANNEL_REFRESH_ATTEMPT: &str = "channel_refresh_attempt";
pub const CHANNEL_REFRESH_ABANDONED: &str = "channel_refresh_abandoned";
pub const CHANNEL_REFRESH_SUCCEEDED: &str = "channel_refresh_succeeded";

pub const CONSUME_STARTED: &str = "consume_started";
pub const CONSUME_FAILED: &str = "consume_failed";
pub const CONSUME_STREAM_ENDED: &str = "consume_stream_ended";

pub const DELIVERY_RECEIVED: &str = "delivery_received";
pub const DELIVERY_MALFORMED: &str = "delivery_malformed";
pub const DELIVERY_FORWARD_FAILED: &str = "delivery_forward_failed";
pub const DELIVERY_RESPONSE_RAW: &str = "delivery_response_raw";
pub const DELIVERY_SETTLE_FAILED: &str = "delivery_settle_failed";
