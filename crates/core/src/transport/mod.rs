//! Broker transport seam and connection supervision
//!
//! This module provides:
//! - The [`Broker`] trait wrapping the pub/sub primitives
//!   (connect / subscribe / publish / flush / drain)
//! - [`ConnectOptions`] with keepalive settings handed to the transport
//! - The [`ConnectionManager`] that keeps the session alive

pub mod broker;
pub mod reconnect;

pub use broker::{Broker, BrokerCall, LinkEvent, MockBroker};
pub use reconnect::{ConnectionManager, ConnectionState, ReconnectConfig};

use std::time::Duration;

/// Parameters for a single connect handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Broker URLs, tried by the transport in order
    pub servers: Vec<String>,
    /// Connection name shown by the broker
    pub name: String,
    /// Heartbeat period
    pub ping_interval: Duration,
    /// Missed heartbeats tolerated before the transport drops the link
    pub max_pings_outstanding: usize,
    /// Transport-level reconnect attempts (None = unlimited)
    pub max_reconnects: Option<usize>,
}

/// Build connect options for a client
///
/// # Features
/// - periodic heartbeat from `config.ping_interval`
/// - bounded count of missed heartbeats
/// - unlimited transport reconnects
pub fn configure_client(servers: &[String], name: &str, config: &ReconnectConfig) -> ConnectOptions {
    ConnectOptions {
        servers: servers.to_vec(),
        name: name.to_string(),
        ping_interval: config.ping_interval,
        max_pings_outstanding: config.max_pings_outstanding,
        max_reconnects: None,
    }
}
