//! JSON codec and subject addressing for bus messages

use bytes::Bytes;
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::types::{Envelope, InboundMessage, Topic};

/// Field of the inbound document holding the reply body
const BODY_FIELD: &str = "body";
/// Field of the inbound document naming the sender
const SOURCE_FIELD: &str = "source";

/// Inbound message after text and JSON decoding
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub topic: Topic,
    pub document: Value,
}

impl Decoded {
    /// Take the `body` field out of the document
    pub fn into_body(mut self) -> Result<(Topic, Value)> {
        let body = self
            .document
            .as_object_mut()
            .and_then(|doc| doc.remove(BODY_FIELD))
            .ok_or(CoreError::MissingField(BODY_FIELD))?;
        Ok((self.topic, body))
    }

    /// Sender id carried in the document, if any
    pub fn source(&self) -> Option<&str> {
        self.document.get(SOURCE_FIELD).and_then(Value::as_str)
    }
}

/// Message codec for serialization/deserialization
pub struct MessageCodec;

impl MessageCodec {
    /// Transport subject for a message to `recipient`
    pub fn subject(root: &str, recipient: &str, topic: &str) -> String {
        format!("{}.{}.{}", root, recipient, topic)
    }

    /// Subscription pattern covering every topic addressed to `client_id`
    pub fn subscription(root: &str, client_id: &str) -> String {
        format!("{}.{}.*", root, client_id)
    }

    /// Encode envelope as JSON bytes
    pub fn encode(envelope: &Envelope) -> Result<Bytes> {
        let payload = serde_json::to_vec(envelope)?;
        Ok(Bytes::from(payload))
    }

    /// Extract the topic (third segment) from a transport subject
    pub fn topic_of(subject: &str) -> Result<Topic> {
        match subject.split('.').nth(2) {
            Some(topic) if !topic.is_empty() => Ok(Topic::from(topic)),
            _ => Err(CoreError::MalformedSubject(subject.to_string())),
        }
    }

    /// Decode inbound payload as UTF-8 text, then JSON, then resolve its topic
    pub fn decode(message: &InboundMessage) -> Result<Decoded> {
        let text = std::str::from_utf8(&message.payload)?;
        let document: Value = serde_json::from_str(text)?;
        let topic = Self::topic_of(&message.subject)?;
        Ok(Decoded { topic, document })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subject_layout() {
        assert_eq!(
            MessageCodec::subject("dunebugger", "core", "terminal_command"),
            "dunebugger.core.terminal_command"
        );
        assert_eq!(
            MessageCodec::subscription("dunebugger", "terminal"),
            "dunebugger.terminal.*"
        );
    }

    #[test]
    fn test_wire_bytes_reproduce_topic_and_body() {
        let body = json!([{"pin": 4, "label": "led", "mode": "OUTPUT", "state": "LOW", "switch": "off"}]);
        let env = Envelope::new(body.clone(), &Topic::ShowGpioStatus, "core");
        let wire = MessageCodec::encode(&env).unwrap();
        let subject = MessageCodec::subject("dunebugger", "terminal", &env.subject);

        let decoded = MessageCodec::decode(&InboundMessage::new(subject, wire)).unwrap();
        assert_eq!(decoded.source(), Some("core"));
        let (topic, decoded_body) = decoded.into_body().unwrap();
        assert_eq!(topic, Topic::ShowGpioStatus);
        assert_eq!(decoded_body, body);
    }

    #[test]
    fn test_invalid_utf8() {
        let msg = InboundMessage::new("root.terminal.log_message", vec![0xff, 0xfe, 0x00]);
        let result = MessageCodec::decode(&msg);
        assert!(matches!(result, Err(CoreError::InvalidEncoding(_))));
    }

    #[test]
    fn test_invalid_json() {
        let msg = InboundMessage::new("root.terminal.log_message", "{not json");
        let result = MessageCodec::decode(&msg);
        assert!(matches!(result, Err(CoreError::Serialization(_))));
    }

    #[test]
    fn test_short_subject() {
        let msg = InboundMessage::new("root.terminal", r#"{"body": 1}"#);
        let result = MessageCodec::decode(&msg);
        assert!(matches!(result, Err(CoreError::MalformedSubject(_))));
    }

    #[test]
    fn test_missing_body() {
        let msg = InboundMessage::new("root.terminal.log_message", r#"{"subject": "log_message"}"#);
        let decoded = MessageCodec::decode(&msg).unwrap();
        assert!(matches!(decoded.into_body(), Err(CoreError::MissingField("body"))));
    }

    #[test]
    fn test_non_object_document_has_no_body() {
        let msg = InboundMessage::new("root.terminal.log_message", "[1, 2]");
        let decoded = MessageCodec::decode(&msg).unwrap();
        assert!(decoded.into_body().is_err());
    }
}
