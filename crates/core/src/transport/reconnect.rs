//! Connection supervision with a fixed retry interval
//!
//! The [`ConnectionManager`] owns the broker session. A single background
//! task establishes the link, re-subscribes after every successful
//! handshake and demotes the state as soon as the transport reports a
//! disconnect. Callers never wait for connectivity: `send` refuses while
//! not connected.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{configure_client, Broker, ConnectOptions, LinkEvent};
use crate::config::Settings;
use crate::protocol::MessageCodec;
use crate::types::{Envelope, InboundMessage, Topic};

/// Capacity of the inbound message channel
const INBOUND_CHANNEL_SIZE: usize = 256;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Pause between supervision rounds, successful or not
    pub retry_interval: Duration,
    /// Heartbeat period handed to the transport
    pub ping_interval: Duration,
    /// Missed heartbeats tolerated by the transport
    pub max_pings_outstanding: usize,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(10),
            ping_interval: Duration::from_secs(5),
            max_pings_outstanding: 3,
        }
    }
}

/// Connection state of the broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// State shared between the manager and its reconnect task
struct Shared {
    broker: Arc<dyn Broker>,
    options: ConnectOptions,
    subject_root: String,
    client_id: String,
    retry_interval: Duration,
    state: AtomicU8,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

struct ListenerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the broker session
pub struct ConnectionManager {
    shared: Arc<Shared>,
    listener: Mutex<Option<ListenerTask>>,
}

impl ConnectionManager {
    /// Create manager for `broker`; nothing connects until
    /// [`start_listener`](Self::start_listener) is called.
    ///
    /// # Returns
    /// The manager and the receiver of every inbound message.
    pub fn new(broker: Arc<dyn Broker>, settings: &Settings) -> (Self, mpsc::Receiver<InboundMessage>) {
        let config = settings.reconnect_config();
        let options = configure_client(
            &settings.message_queue.servers,
            settings.client_id(),
            &config,
        );
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);

        let shared = Arc::new(Shared {
            broker,
            options,
            subject_root: settings.subject_root().to_string(),
            client_id: settings.client_id().to_string(),
            retry_interval: config.retry_interval,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            inbound_tx,
        });

        let manager = Self {
            shared,
            listener: Mutex::new(None),
        };
        (manager, inbound_rx)
    }

    /// Client identity used as envelope source
    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the session is connected and subscribed
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn listener(&self) -> MutexGuard<'_, Option<ListenerTask>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the reconnect task unless one is already running
    ///
    /// Returns immediately; the first handshake happens in the background.
    pub fn start_listener(&self) {
        let mut slot = self.listener();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                debug!("Listener already running");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            reconnect_loop(shared, task_cancel).await;
        });

        *slot = Some(ListenerTask { cancel, handle });
        debug!("Listener started");
    }

    /// Stop the reconnect task, wait for it to exit, then drain the session
    ///
    /// Safe to call when never started or never connected.
    pub async fn close_listener(&self) {
        let task = self.listener().take();
        if let Some(ListenerTask { cancel, handle }) = task {
            cancel.cancel();
            match handle.await {
                Ok(()) => debug!("Listener stopped"),
                Err(e) if e.is_cancelled() => debug!("Listener cancelled"),
                Err(e) => error!("Listener task failed: {}", e),
            }
        }

        if self.is_connected() {
            match self.shared.broker.drain().await {
                Ok(()) => debug!("Message broker connection closed"),
                Err(e) => error!("Error closing message broker connection: {}", e),
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Publish `envelope` to `<root>.<recipient>.<envelope.subject>`
    ///
    /// Fails fast without touching the transport when not connected.
    /// Encoding and transport errors are logged and reported as `false`.
    pub async fn send(&self, envelope: &Envelope, recipient: &str, reply_to: Option<&str>) -> bool {
        if !self.is_connected() {
            warn!(topic = %envelope.subject, recipient, "Not connected, message not sent");
            return false;
        }

        let payload = match MessageCodec::encode(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Error encoding message: {}", e);
                return false;
            }
        };

        let subject = MessageCodec::subject(&self.shared.subject_root, recipient, &envelope.subject);
        match self
            .shared
            .broker
            .publish(subject, reply_to.map(str::to_string), payload)
            .await
        {
            Ok(()) => {
                debug!(topic = %envelope.subject, recipient, "Message sent");
                true
            }
            Err(e) => {
                error!("Error sending message: {}", e);
                false
            }
        }
    }

    /// Wrap `body` in an envelope from this client and send it
    pub async fn dispatch(
        &self,
        body: impl Into<Value>,
        topic: &Topic,
        recipient: &str,
        reply_to: Option<&str>,
    ) -> bool {
        let envelope = Envelope::new(body, topic, self.client_id());
        self.send(&envelope, recipient, reply_to).await
    }

    /// Poll until connected, checking every `poll_interval`
    pub async fn wait_connected(&self, poll_interval: Duration) {
        while !self.is_connected() {
            sleep(poll_interval).await;
        }
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn subscription(&self) -> String {
        MessageCodec::subscription(&self.subject_root, &self.client_id)
    }

    /// One connect + subscribe attempt
    ///
    /// Connected is only exposed once the subscription is in place.
    async fn handshake(&self, events: mpsc::UnboundedSender<LinkEvent>) {
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.broker.connect(&self.options, events).await {
            self.set_state(ConnectionState::Disconnected);
            debug!(
                "Connect attempt to {:?} failed: {}, retrying in {:?}",
                self.options.servers, e, self.retry_interval
            );
            return;
        }
        info!("Connected to message broker: {:?}", self.options.servers);

        let subject = self.subscription();
        let subscribed = match self.broker.subscribe(&subject, self.inbound_tx.clone()).await {
            Ok(()) => self.broker.flush().await,
            Err(e) => Err(e),
        };

        match subscribed {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                info!("Listening for messages on {}", subject);
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                error!("Failed to subscribe to {}: {}", subject, e);
            }
        }
    }

    fn on_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Disconnected => {
                self.set_state(ConnectionState::Disconnected);
                warn!("Disconnected from message broker");
            }
            LinkEvent::Reconnected => {
                info!("Transport reconnected, waiting for resubscription");
            }
            LinkEvent::Error(e) => {
                error!("Message broker error: {}", e);
            }
        }
    }
}

/// Background supervision loop
///
/// 1. If not connected, attempt one handshake
/// 2. Sleep the retry interval, applying link events as they arrive
/// 3. Repeat until cancelled
async fn reconnect_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let (link_tx, mut link_rx) = mpsc::unbounded_channel();

    'supervise: loop {
        if !shared.is_connected() {
            // Events queued before this handshake belong to the old session
            while let Ok(stale) = link_rx.try_recv() {
                debug!(?stale, "Discarding link event from previous session");
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'supervise,
                _ = shared.handshake(link_tx.clone()) => {}
            }
        }

        let pause = sleep(shared.retry_interval);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'supervise,
                Some(event) = link_rx.recv() => shared.on_link_event(event),
                _ = &mut pause => break,
            }
        }
    }

    debug!("Reconnect loop exiting");
}
