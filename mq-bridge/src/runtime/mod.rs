//! Runtime integration layer.
//!
//! Keeps the long-lived broker connection and its watcher task in one place so
//! reconnect timing stays isolated from channel and dispatch logic.

pub(crate) mod connection_supervisor;
