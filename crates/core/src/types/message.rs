//! Bus messages

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Topic;

/// Outbound message envelope
///
/// `subject` names the logical topic only; the transport subject used for
/// addressing is `<root>.<recipient>.<subject>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub body: Value,
    pub subject: String,
    pub source: String,
}

impl Envelope {
    /// Create new envelope for `topic`, sent by `source`
    pub fn new(body: impl Into<Value>, topic: &Topic, source: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            subject: topic.as_str().to_string(),
            source: source.into(),
        }
    }
}

/// Message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full dotted transport subject
    pub subject: String,
    /// Point-to-point reply address, if the sender set one
    pub reply_to: Option<String>,
    /// Raw serialized body
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply_to: None,
            payload: payload.into(),
        }
    }

    /// Set the reply address
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}
