//! Dunebugger Core - messaging client for the dunebugger terminal
//!
//! This crate provides:
//! - Bus message types and the topic enumeration
//! - JSON codec and subject addressing
//! - Broker abstraction and the reconnecting connection manager
//! - Reply routing towards the terminal session
//! - Settings and version information

/// Well-known recipient id of the remote device
pub const CORE_RECIPIENT: &str = "core";
/// Body of the startup request for the command table
pub const GET_COMMANDS_LIST: &str = "get_commands_list";

pub mod config;
pub mod error;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod types;
pub mod version;

// Re-export common types
pub use config::Settings;
pub use error::{CoreError, Result};
pub use protocol::MessageCodec;
pub use router::{ReplyHandler, ReplyOutcome, ReplyRouter};
pub use transport::{Broker, ConnectionManager, ConnectionState, LinkEvent, MockBroker};
pub use types::{CommandTable, Envelope, InboundMessage, Topic, VersionInfo};
