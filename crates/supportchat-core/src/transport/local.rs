//! In-memory session transport
//!
//! `LocalTransport` is paired with a `LocalPeer` that plays the chat backend:
//! it injects inbound frames, observes outbound frames and can make the
//! channel fail. Frames go through the same wire codec as network transports.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{DeliveryReceipt, LinkState, SessionTransport};
use crate::errors::{ChatError, Result};
use crate::message::ChatMessage;
use crate::subscription::{InboundHandler, Subscribers, SubscriptionId};
use crate::types::{ClientId, MessageId, Timestamp};
use crate::wire;

// ----------------------------------------------------------------------------
// Shared Link
// ----------------------------------------------------------------------------

#[derive(Default)]
struct LinkInner {
    client_id: Option<ClientId>,
    fail_next_connect: Option<String>,
    connect_attempts: u32,
}

struct LocalLink {
    inner: Mutex<LinkInner>,
    subscribers: Subscribers,
    state_tx: watch::Sender<LinkState>,
}

impl LocalLink {
    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Local Transport
// ----------------------------------------------------------------------------

/// Session transport backed by an in-process peer
pub struct LocalTransport {
    link: Arc<LocalLink>,
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl LocalTransport {
    /// Create a transport and the peer that sits on the other end
    pub fn pair() -> (LocalTransport, LocalPeer) {
        let (state_tx, _) = watch::channel(LinkState::Down);
        let link = Arc::new(LocalLink {
            inner: Mutex::new(LinkInner::default()),
            subscribers: Subscribers::new(),
            state_tx,
        });
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let transport = LocalTransport {
            link: Arc::clone(&link),
            outbound_tx,
        };
        let peer = LocalPeer { link, outbound_rx };
        (transport, peer)
    }
}

#[async_trait]
impl SessionTransport for LocalTransport {
    async fn connect(&mut self, client_id: &ClientId) -> Result<()> {
        let mut inner = self.link.lock();
        if let Some(existing) = &inner.client_id {
            return Err(ChatError::AlreadyConnected {
                client_id: existing.clone(),
            });
        }

        inner.connect_attempts += 1;
        if let Some(reason) = inner.fail_next_connect.take() {
            warn!(client_id = %client_id, "Local connect refused: {}", reason);
            return Err(ChatError::connection(client_id, reason));
        }

        inner.client_id = Some(client_id.clone());
        drop(inner);

        self.link.state_tx.send_replace(LinkState::Up);
        info!(client_id = %client_id, "Local channel connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let previous = self.link.lock().client_id.take();
        match previous {
            Some(client_id) => {
                self.link.state_tx.send_replace(LinkState::Down);
                info!(client_id = %client_id, "Local channel disconnected");
            }
            None => debug!("Disconnect on idle local channel ignored"),
        }
        Ok(())
    }

    async fn send(&mut self, message: &ChatMessage) -> Result<DeliveryReceipt> {
        let client_id = self.link.lock().client_id.clone();
        let client_id = client_id.ok_or(ChatError::NotConnected)?;

        let frame = wire::encode_outbound(message)?;
        self.outbound_tx
            .send(frame)
            .map_err(|_| ChatError::connection(&client_id, "local peer is gone"))?;

        debug!(client_id = %client_id, message_id = %message.id(), "Frame handed to local peer");
        Ok(DeliveryReceipt::delivered())
    }

    fn subscribe(&self, handler: InboundHandler) -> SubscriptionId {
        self.link.subscribers.subscribe(handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.link.subscribers.unsubscribe(id)
    }

    fn is_connected(&self) -> bool {
        self.link.lock().client_id.is_some()
    }

    fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.state_tx.subscribe()
    }

    fn client_id(&self) -> Option<ClientId> {
        self.link.lock().client_id.clone()
    }
}

// ----------------------------------------------------------------------------
// Local Peer
// ----------------------------------------------------------------------------

/// Backend side of a `LocalTransport`
pub struct LocalPeer {
    link: Arc<LocalLink>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl LocalPeer {
    /// Client id the transport is connected for
    pub fn connected_client(&self) -> Option<ClientId> {
        self.link.lock().client_id.clone()
    }

    /// Number of connect calls that got past the already-connected check
    pub fn connect_attempts(&self) -> u32 {
        self.link.lock().connect_attempts
    }

    /// Make the next connect attempt fail with `reason`
    pub fn fail_next_connect(&self, reason: impl Into<String>) {
        self.link.lock().fail_next_connect = Some(reason.into());
    }

    /// Simulate the channel being lost mid-session
    pub fn drop_link(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let previous = self.link.lock().client_id.take();
        if let Some(client_id) = previous {
            warn!(client_id = %client_id, "Local channel dropped: {}", reason);
            self.link
                .state_tx
                .send_replace(LinkState::Dropped { reason });
        }
    }

    /// Deliver a raw inbound frame
    ///
    /// Returns `true` if the frame decoded and reached the subscribers. Frames
    /// arriving while disconnected, or that fail to decode, are discarded.
    pub fn push_frame(&self, frame: &str) -> bool {
        let Some(client_id) = self.connected_client() else {
            debug!("Inbound frame discarded: channel is down");
            return false;
        };

        match wire::decode_inbound(frame, &client_id) {
            Ok(message) => {
                self.link.subscribers.dispatch(&message);
                true
            }
            Err(e) => {
                warn!(client_id = %client_id, "Dropping inbound frame: {}", e);
                false
            }
        }
    }

    /// Send a message from the agent side, returning its id
    pub fn push_message(&self, content: &str) -> Result<MessageId> {
        let client_id = self.connected_client().ok_or(ChatError::NotConnected)?;
        let id = MessageId::generate();
        let frame = wire::encode_inbound(Some(id), &client_id, content, Timestamp::now())?;
        if self.push_frame(&frame) {
            Ok(id)
        } else {
            Err(ChatError::NotConnected)
        }
    }

    /// Reflect a session's own message back to it, as some backends do
    pub fn echo(&self, message: &ChatMessage) -> bool {
        match wire::encode_inbound(
            Some(message.id()),
            message.client_id(),
            message.content(),
            message.timestamp(),
        ) {
            Ok(frame) => self.push_frame(&frame),
            Err(_) => false,
        }
    }

    /// Next outbound message already written by the transport, if any
    pub fn try_next_sent(&mut self) -> Option<ChatMessage> {
        loop {
            let frame = self.outbound_rx.try_recv().ok()?;
            if let Some(message) = Self::decode_sent(&frame) {
                return Some(message);
            }
        }
    }

    /// Wait for the next outbound message
    pub async fn next_sent(&mut self) -> Option<ChatMessage> {
        loop {
            let frame = self.outbound_rx.recv().await?;
            if let Some(message) = Self::decode_sent(&frame) {
                return Some(message);
            }
        }
    }

    fn decode_sent(frame: &str) -> Option<ChatMessage> {
        match wire::decode_outbound(frame) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Local peer received undecodable frame: {}", e);
                None
            }
        }
    }
}
