//! Domain types for the terminal bus protocol

mod command;
mod message;
mod reply;
mod topic;

pub use command::{CommandEntry, CommandTable};
pub use message::{Envelope, InboundMessage};
pub use reply::{CommandReply, GpioPin, LogRecord, VersionInfo};
pub use topic::Topic;
