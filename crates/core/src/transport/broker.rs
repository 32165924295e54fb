//! Pub/sub broker abstraction

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::ConnectOptions;
use crate::error::{CoreError, Result};
use crate::types::InboundMessage;

/// Link state notifications pushed by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Transport lost the broker
    Disconnected,
    /// Transport re-established the link on its own
    Reconnected,
    /// Asynchronous transport error
    Error(String),
}

/// Broker abstraction for pub/sub operations
///
/// Implementations deliver link events and inbound messages through the
/// channels handed to [`connect`](Broker::connect) and
/// [`subscribe`](Broker::subscribe) instead of callbacks.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Perform one connect handshake, replacing any previous session
    async fn connect(
        &self,
        options: &ConnectOptions,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<()>;

    /// Subscribe to a subject pattern, forwarding messages to `inbound`
    async fn subscribe(&self, subject: &str, inbound: mpsc::Sender<InboundMessage>) -> Result<()>;

    /// Wait until pending protocol traffic reached the broker
    async fn flush(&self) -> Result<()>;

    /// Publish payload on `subject`
    async fn publish(&self, subject: String, reply_to: Option<String>, payload: Bytes) -> Result<()>;

    /// Drain subscriptions and close the session
    async fn drain(&self) -> Result<()>;
}

/// Call recorded by [`MockBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Connect,
    Subscribe(String),
    Flush,
    Publish {
        subject: String,
        reply_to: Option<String>,
        payload: Bytes,
    },
    Drain,
}

#[derive(Default)]
struct MockState {
    calls: Vec<BrokerCall>,
    failing_connects: usize,
    failing_subscribes: usize,
    failing_publishes: bool,
    events: Option<mpsc::UnboundedSender<LinkEvent>>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
}

/// Mock broker for testing
#[derive(Default)]
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    /// Create new mock broker
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` connect handshakes fail
    pub fn fail_next_connects(&self, count: usize) {
        self.state().failing_connects = count;
    }

    /// Make the next `count` subscribe calls fail
    pub fn fail_next_subscribes(&self, count: usize) {
        self.state().failing_subscribes = count;
    }

    /// Make every publish fail until reset
    pub fn fail_publishes(&self, failing: bool) {
        self.state().failing_publishes = failing;
    }

    /// All calls received so far
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state().calls.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, BrokerCall::Connect))
    }

    pub fn subscribe_count(&self) -> usize {
        self.count(|c| matches!(c, BrokerCall::Subscribe(_)))
    }

    /// Published `(subject, reply_to, payload)` triples
    pub fn published(&self) -> Vec<(String, Option<String>, Bytes)> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                BrokerCall::Publish {
                    subject,
                    reply_to,
                    payload,
                } => Some((subject.clone(), reply_to.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&BrokerCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    /// Push a link event as the transport would
    pub fn emit(&self, event: LinkEvent) -> bool {
        match &self.state().events {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver an inbound message to the active subscription
    pub async fn deliver(&self, message: InboundMessage) -> bool {
        let inbound = self.state().inbound.clone();
        match inbound {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn connect(
        &self,
        _options: &ConnectOptions,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BrokerCall::Connect);
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(CoreError::Connection("connection refused".into()));
        }
        state.events = Some(events);
        Ok(())
    }

    async fn subscribe(&self, subject: &str, inbound: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BrokerCall::Subscribe(subject.to_string()));
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(CoreError::Subscribe("permissions violation".into()));
        }
        state.inbound = Some(inbound);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.state().calls.push(BrokerCall::Flush);
        Ok(())
    }

    async fn publish(&self, subject: String, reply_to: Option<String>, payload: Bytes) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BrokerCall::Publish {
            subject,
            reply_to,
            payload,
        });
        if state.failing_publishes {
            return Err(CoreError::Publish("broken pipe".into()));
        }
        Ok(())
    }

    async fn drain(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BrokerCall::Drain);
        state.events = None;
        state.inbound = None;
        Ok(())
    }
}
