//! Errors surfaced by the bridge entry points.

use crate::broker::BrokerError;
use crate::subscription::LookupError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The broker could not be dialed.
    #[error("connection error: {0}")]
    Connection(#[source] BrokerError),
    /// The supervisor is between connections and refuses channel work.
    #[error("broker connection is down, reconnect in progress")]
    Disconnected,
    /// Opening, consuming on or closing a channel failed.
    #[error("channel error for {identity:?}: {source}")]
    Channel {
        identity: String,
        #[source]
        source: BrokerError,
    },
    #[error("no channel registered for identity {0:?}")]
    ChannelNotFound(String),
    /// The identity was closed while its consumption was being established.
    #[error("identity {0:?} was torn down while consumption was starting")]
    TornDown(String),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl BridgeError {
    pub(crate) fn channel(identity: &str, source: BrokerError) -> Self {
        Self::Channel {
            identity: identity.to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: json5::Error,
    },
    #[error("invalid config: {0}")]
    Syntax(#[source] json5::Error),
}
