//! Inbound reply routing
//!
//! Every inbound message ends up as exactly one of: a reply handed to the
//! [`ReplyHandler`], a `version_info` answer published directly, or a
//! logged error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::protocol::{Decoded, MessageCodec};
use crate::transport::ConnectionManager;
use crate::types::{Envelope, InboundMessage, Topic, VersionInfo};

/// What a processed reply resulted in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Printed to the operator
    Rendered,
    /// Re-emitted through the local logger at this level
    Logged(tracing::Level),
    /// Command table replaced, with this many commands
    CommandsUpdated(usize),
    /// Topic not handled by this client
    Unrecognized,
    /// Payload absent or falsy
    Empty,
    /// `get_version` answered
    VersionSent,
}

/// Presentation side of the reply path
#[async_trait]
pub trait ReplyHandler: Send + Sync {
    /// Handle the body of a reply received on `topic`
    async fn handle_reply(&self, topic: &Topic, payload: Value) -> Result<ReplyOutcome>;
}

/// Decodes inbound messages and routes them by topic
pub struct ReplyRouter<H> {
    manager: Arc<ConnectionManager>,
    handler: Arc<H>,
    version: VersionInfo,
}

impl<H: ReplyHandler> ReplyRouter<H> {
    pub fn new(manager: Arc<ConnectionManager>, handler: Arc<H>, version: VersionInfo) -> Self {
        Self {
            manager,
            handler,
            version,
        }
    }

    /// Route one inbound message
    ///
    /// Returns `None` when the message was dropped; the reason is logged.
    pub async fn process(&self, message: InboundMessage) -> Option<ReplyOutcome> {
        let decoded = match MessageCodec::decode(&message) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(
                    subject = %message.subject,
                    "Failed to decode message: {}. Raw message: {:?}",
                    e, message.payload
                );
                return None;
            }
        };

        if decoded.topic == Topic::GetVersion {
            return self.answer_version(&message, &decoded).await;
        }

        let (topic, body) = match decoded.into_body() {
            Ok(parts) => parts,
            Err(e) => {
                error!("{}. Message: {}", e, String::from_utf8_lossy(&message.payload));
                return None;
            }
        };

        match self.handler.handle_reply(&topic, body).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(
                    topic = %topic,
                    "Error processing message: {}. Message: {}",
                    e,
                    String::from_utf8_lossy(&message.payload)
                );
                None
            }
        }
    }

    /// Answer a version query on `version_info`
    ///
    /// The destination is the transport reply address, else the `source`
    /// field of the request.
    async fn answer_version(&self, message: &InboundMessage, decoded: &Decoded) -> Option<ReplyOutcome> {
        let recipient = match message.reply_to.as_deref().or_else(|| decoded.source()) {
            Some(recipient) => recipient,
            None => {
                error!(
                    "Version request without reply address. Message: {}",
                    String::from_utf8_lossy(&message.payload)
                );
                return None;
            }
        };

        let body = match serde_json::to_value(&self.version) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode version info: {}", e);
                return None;
            }
        };

        let envelope = Envelope::new(body, &Topic::VersionInfo, self.manager.client_id());
        if self.manager.send(&envelope, recipient, None).await {
            debug!(recipient, "Version info sent");
            Some(ReplyOutcome::VersionSent)
        } else {
            warn!(recipient, "Version info not sent");
            None
        }
    }

    /// Process inbound messages one at a time until the channel closes
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            self.process(message).await;
        }
        debug!("Reply router exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::transport::{Broker, MockBroker};
    use crate::CoreError;
    use serde_json::json;
    use std::fmt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Layer keeping `(level, message)` of every event
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<Mutex<Vec<(Level, String)>>>);

    impl CapturedEvents {
        fn take(&self) -> Vec<(Level, String)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct MessageField(String);

    impl Visit for MessageField {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: Subscriber> Layer<S> for CapturedEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut message = MessageField(String::new());
            event.record(&mut message);
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), message.0));
        }
    }

    /// Records every reply it is handed
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(Topic, Value)>>,
        fail: bool,
    }

    impl RecordingHandler {
        fn seen(&self) -> Vec<(Topic, Value)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplyHandler for RecordingHandler {
        async fn handle_reply(&self, topic: &Topic, payload: Value) -> Result<ReplyOutcome> {
            self.seen.lock().unwrap().push((topic.clone(), payload));
            if self.fail {
                return Err(CoreError::Handler("render failed".into()));
            }
            Ok(ReplyOutcome::Rendered)
        }
    }

    struct Fixture {
        broker: Arc<MockBroker>,
        manager: Arc<ConnectionManager>,
        handler: Arc<RecordingHandler>,
        router: ReplyRouter<RecordingHandler>,
    }

    async fn fixture(handler: RecordingHandler) -> Fixture {
        let broker = Arc::new(MockBroker::new());
        let dyn_broker: Arc<dyn Broker> = broker.clone();
        let (manager, _rx) = ConnectionManager::new(dyn_broker, &Settings::default());
        let manager = Arc::new(manager);
        manager.start_listener();
        manager.wait_connected(Duration::from_millis(1)).await;

        let handler = Arc::new(handler);
        let version = VersionInfo::new("terminal", "1.0.0", "release", "0123456789");
        let router = ReplyRouter::new(manager.clone(), handler.clone(), version);
        Fixture {
            broker,
            manager,
            handler,
            router,
        }
    }

    fn inbound(topic: &str, doc: Value) -> InboundMessage {
        InboundMessage::new(format!("dunebugger.terminal.{}", topic), doc.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_forwarded_to_handler() {
        let fx = fixture(RecordingHandler::default()).await;
        let msg = inbound(
            "log_message",
            json!({"body": {"level": "INFO", "message": "hi"}, "subject": "log_message", "source": "core"}),
        );

        assert_eq!(fx.router.process(msg).await, Some(ReplyOutcome::Rendered));
        assert_eq!(
            fx.handler.seen(),
            vec![(Topic::LogMessage, json!({"level": "INFO", "message": "hi"}))]
        );
        fx.manager.close_listener().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_messages_never_reach_handler() {
        let fx = fixture(RecordingHandler::default()).await;
        let bad = vec![
            InboundMessage::new("dunebugger.terminal.log_message", vec![0xc3, 0x28]),
            InboundMessage::new("dunebugger.terminal.log_message", "{\"body\": "),
            inbound("log_message", json!({"subject": "log_message"})),
            InboundMessage::new("dunebugger.terminal", json!({"body": 1}).to_string()),
        ];

        let events = CapturedEvents::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
        for msg in bad {
            let subject = msg.subject.clone();
            assert_eq!(fx.router.process(msg).await, None);

            let logged = events.take();
            let errors: Vec<_> = logged.iter().filter(|(level, _)| *level == Level::ERROR).collect();
            assert_eq!(errors.len(), 1, "{subject}: {logged:?}");
        }
        assert!(fx.handler.seen().is_empty());
        fx.manager.close_listener().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_error_is_contained() {
        let fx = fixture(RecordingHandler {
            fail: true,
            ..Default::default()
        })
        .await;
        let msg = inbound("show_configuration", json!({"body": [{"a": 1}]}));

        let events = CapturedEvents::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
        assert_eq!(fx.router.process(msg).await, None);
        assert_eq!(fx.handler.seen().len(), 1);
        let errors: Vec<_> = events
            .take()
            .into_iter()
            .filter(|(level, _)| *level == Level::ERROR)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("render failed"));
        fx.manager.close_listener().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_version_answered_to_reply_address() {
        let fx = fixture(RecordingHandler::default()).await;
        let msg = inbound("get_version", json!({"body": null, "source": "core"})).with_reply_to("monitor");

        assert_eq!(fx.router.process(msg).await, Some(ReplyOutcome::VersionSent));
        assert!(fx.handler.seen().is_empty());

        let published = fx.broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "dunebugger.monitor.version_info");
        let doc: Value = serde_json::from_slice(&published[0].2).unwrap();
        assert_eq!(doc["subject"], "version_info");
        assert_eq!(doc["source"], "terminal");
        assert_eq!(doc["body"]["full_version"], "1.0.0-release+0123456");
        fx.manager.close_listener().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_version_falls_back_to_source() {
        let fx = fixture(RecordingHandler::default()).await;
        let msg = inbound("get_version", json!({"body": null, "source": "core"}));

        assert_eq!(fx.router.process(msg).await, Some(ReplyOutcome::VersionSent));
        let published = fx.broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "dunebugger.core.version_info");
        fx.manager.close_listener().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_version_without_destination_dropped() {
        let fx = fixture(RecordingHandler::default()).await;
        let msg = inbound("get_version", json!({"body": null}));

        assert_eq!(fx.router.process(msg).await, None);
        assert!(fx.broker.published().is_empty());
        assert!(fx.handler.seen().is_empty());
        fx.manager.close_listener().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_consumes_until_channel_closes() {
        let fx = fixture(RecordingHandler::default()).await;
        let (tx, rx) = mpsc::channel(8);
        let handler = fx.handler.clone();
        let task = tokio::spawn(fx.router.run(rx));

        tx.send(inbound("show_gpio_status", json!({"body": []}))).await.unwrap();
        tx.send(inbound("commands_list", json!({"body": {}}))).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let topics: Vec<Topic> = handler.seen().into_iter().map(|(t, _)| t).collect();
        assert_eq!(topics, vec![Topic::ShowGpioStatus, Topic::CommandsList]);
        fx.manager.close_listener().await;
    }
}
