//! NATS implementation of the broker seam

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, Event};
use async_trait::async_trait;
use bytes::Bytes;
use dunebugger_core::transport::{Broker, ConnectOptions, LinkEvent};
use dunebugger_core::{CoreError, InboundMessage, Result};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long buffered messages may keep flowing to the router after a drain
const DRAIN_GRACE: Duration = Duration::from_secs(2);

struct Session {
    client: Client,
    forwarder: Option<JoinHandle<()>>,
}

impl Session {
    fn stop_forwarding(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

/// Wait for a forwarding task to run dry, aborting it after `grace`
///
/// Returns whether the task finished on its own.
async fn finish_forwarding(mut forwarder: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut forwarder).await {
        Ok(_) => true,
        Err(_) => {
            forwarder.abort();
            false
        }
    }
}

/// Broker backed by an `async-nats` client
#[derive(Default)]
pub struct NatsBroker {
    session: Mutex<Option<Session>>,
}

impl NatsBroker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self) -> Result<Client> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(CoreError::NotConnected)
    }
}

fn link_event(event: Event) -> Option<LinkEvent> {
    match event {
        Event::Disconnected => Some(LinkEvent::Disconnected),
        Event::Connected => Some(LinkEvent::Reconnected),
        Event::ServerError(e) => Some(LinkEvent::Error(e.to_string())),
        Event::ClientError(e) => Some(LinkEvent::Error(e.to_string())),
        other => {
            debug!("NATS event: {}", other);
            None
        }
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn connect(
        &self,
        options: &ConnectOptions,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<()> {
        if let Some(mut old) = self.session.lock().await.take() {
            old.stop_forwarding();
        }

        debug!(
            max_pings_outstanding = options.max_pings_outstanding,
            "Connecting to {}",
            options.servers.join(",")
        );

        // The first Connected event belongs to this handshake, not a reconnect
        let established = Arc::new(AtomicBool::new(false));
        let client = async_nats::ConnectOptions::new()
            .name(&options.name)
            .ping_interval(options.ping_interval)
            .max_reconnects(options.max_reconnects)
            .event_callback(move |event| {
                let events = events.clone();
                let established = established.clone();
                async move {
                    if matches!(event, Event::Connected) && !established.swap(true, Ordering::AcqRel) {
                        return;
                    }
                    if let Some(link) = link_event(event) {
                        let _ = events.send(link);
                    }
                }
            })
            .connect(options.servers.join(","))
            .await
            .map_err(|e| CoreError::Connection(e.to_string()))?;

        *self.session.lock().await = Some(Session {
            client,
            forwarder: None,
        });
        Ok(())
    }

    async fn subscribe(&self, subject: &str, inbound: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(CoreError::NotConnected)?;

        let mut subscriber = session
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| CoreError::Subscribe(e.to_string()))?;

        session.stop_forwarding();
        session.forwarder = Some(tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let inbound_message = InboundMessage {
                    subject: message.subject.to_string(),
                    reply_to: message.reply.map(|r| r.to_string()),
                    payload: message.payload,
                };
                if inbound.send(inbound_message).await.is_err() {
                    break;
                }
            }
            debug!("Subscription stream ended");
        }));
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.client()
            .await?
            .flush()
            .await
            .map_err(|e| CoreError::Connection(e.to_string()))
    }

    async fn publish(&self, subject: String, reply_to: Option<String>, payload: Bytes) -> Result<()> {
        let client = self.client().await?;
        let published = match reply_to {
            Some(reply) => client.publish_with_reply(subject, reply, payload).await,
            None => client.publish(subject, payload).await,
        };
        published.map_err(|e| CoreError::Publish(e.to_string()))
    }

    async fn drain(&self) -> Result<()> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };

        // Unsubscribes, delivers what is already buffered, then closes the client
        if let Err(e) = session.client.drain().await {
            session.stop_forwarding();
            return Err(CoreError::Connection(e.to_string()));
        }

        if let Some(forwarder) = session.forwarder.take() {
            if finish_forwarding(forwarder, DRAIN_GRACE).await {
                debug!("Subscription drained");
            } else {
                warn!("Subscription still delivering after {:?}, dropped", DRAIN_GRACE);
            }
        }
        Ok(())
    }
}
