//! Chat session controller
//!
//! A `ChatSession` owns the ordered message log for one client and the
//! transport that carries it. It is driven from a single task: every method
//! takes `&mut self`, and inbound messages only enter the log when the owner
//! pumps them with `recv` or `drain_inbound`.
//!
//! Lifecycle: `Idle → Connecting → Connected → Disconnected`. `Disconnected`
//! is terminal; chatting again requires a new session with a fresh log.

use core::fmt;
use std::sync::Arc;

use hashbrown::HashSet;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::errors::{ChatError, Result};
use crate::message::ChatMessage;
use crate::subscription::SubscriptionId;
use crate::transport::{DeliveryReceipt, LinkState, SessionTransport};
use crate::types::{ClientId, MessageId};

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Connection state of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Result of `ChatSession::send_outbound`
#[derive(Debug)]
pub enum SendOutcome {
    /// Appended and handed to the transport
    Dispatched {
        id: MessageId,
        receipt: DeliveryReceipt,
    },
    /// Appended, but the transport refused the frame
    Undelivered { id: MessageId, reason: String },
    /// Session not connected; nothing appended or queued
    Dropped,
}

impl SendOutcome {
    /// Id of the appended message, if one was appended
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            SendOutcome::Dispatched { id, .. } | SendOutcome::Undelivered { id, .. } => Some(*id),
            SendOutcome::Dropped => None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, SendOutcome::Dispatched { .. })
    }
}

// ----------------------------------------------------------------------------
// Chat Session
// ----------------------------------------------------------------------------

/// Per-client chat session with an append-only message log
pub struct ChatSession<T: SessionTransport> {
    client_id: ClientId,
    state: SessionState,
    config: SessionConfig,
    log: Vec<ChatMessage>,
    /// Ids present in `log`, used to suppress echoed messages
    seen: HashSet<MessageId>,
    transport: T,
    inbox: mpsc::UnboundedReceiver<ChatMessage>,
    subscription: Option<SubscriptionId>,
    link: watch::Receiver<LinkState>,
}

enum Pumped {
    Message(Option<ChatMessage>),
    LinkChanged(bool),
}

impl<T: SessionTransport> ChatSession<T> {
    /// Create a session for `client_id` and connect its transport
    ///
    /// A refused or failed connection is logged and yields a session in the
    /// `Disconnected` state. Handing over a transport that is already
    /// connected is a caller error and is returned as
    /// `ChatError::AlreadyConnected`.
    pub async fn open(client_id: ClientId, transport: T, config: SessionConfig) -> Result<Self> {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        // Subscribe before connecting so nothing sent right after the
        // handshake is missed
        let subscription = transport.subscribe(Arc::new(move |message: &ChatMessage| {
            let _ = inbox_tx.send(message.clone());
        }));
        let link = transport.link_state();

        let mut session = Self {
            client_id,
            state: SessionState::Idle,
            config,
            log: Vec::new(),
            seen: HashSet::new(),
            transport,
            inbox,
            subscription: Some(subscription),
            link,
        };

        session.set_state(SessionState::Connecting);
        match session.transport.connect(&session.client_id).await {
            Ok(()) => {
                session.set_state(SessionState::Connected);
                // The channel may already have dropped by the time connect returns
                session.sync_link();
                if session.is_connected() {
                    info!(client_id = %session.client_id, "Chat session connected");
                }
            }
            Err(err @ ChatError::AlreadyConnected { .. }) => {
                session.release_subscription();
                return Err(err);
            }
            Err(err) => {
                error!(client_id = %session.client_id, "Chat session failed to connect: {}", err);
                session.release_subscription();
                session.set_state(SessionState::Disconnected);
            }
        }

        Ok(session)
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Messages in the order they were observed
    pub fn messages(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Append an inbound message
    ///
    /// Returns `false` if the message was suppressed: either its id is
    /// already in the log (an echo of an optimistic append) or it belongs to
    /// another client.
    pub fn append_inbound(&mut self, message: ChatMessage) -> bool {
        if message.client_id() != &self.client_id {
            warn!(
                client_id = %self.client_id,
                "Ignoring message addressed to {}",
                message.client_id()
            );
            return false;
        }
        if !self.seen.insert(message.id()) {
            debug!(client_id = %self.client_id, message_id = %message.id(), "Suppressed duplicate message");
            return false;
        }

        self.log.push(message);
        true
    }

    /// Compose and send a local message
    ///
    /// While connected the message is appended before the transport is asked
    /// to deliver it. While disconnected nothing is appended or queued and
    /// `SendOutcome::Dropped` is returned. Only invalid content is an error.
    pub async fn send_outbound(&mut self, content: impl Into<String>) -> Result<SendOutcome> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ChatError::invalid_message("content must not be empty"));
        }
        if content.len() > self.config.max_content_len {
            return Err(ChatError::invalid_message(format!(
                "content is {} bytes, limit is {}",
                content.len(),
                self.config.max_content_len
            )));
        }

        self.sync_link();
        if !self.is_connected() {
            debug!(client_id = %self.client_id, state = %self.state, "Dropping outbound message");
            return Ok(SendOutcome::Dropped);
        }

        let message = ChatMessage::local(self.client_id.clone(), content)?;
        let id = message.id();
        self.seen.insert(id);
        self.log.push(message);

        let index = self.log.len() - 1;
        match self.transport.send(&self.log[index]).await {
            Ok(receipt) => Ok(SendOutcome::Dispatched { id, receipt }),
            Err(err) => {
                warn!(client_id = %self.client_id, message_id = %id, "Outbound message not delivered: {}", err);
                if matches!(err, ChatError::NotConnected) {
                    self.mark_disconnected("transport reported not connected");
                }
                Ok(SendOutcome::Undelivered {
                    id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Wait for the next inbound message and append it
    ///
    /// Suppressed duplicates are skipped. Returns `None` once the session is
    /// disconnected; messages that arrived before a drop are still returned.
    pub async fn recv(&mut self) -> Option<&ChatMessage> {
        loop {
            self.sync_link();
            if !self.is_connected() {
                while let Ok(message) = self.inbox.try_recv() {
                    if self.append_inbound(message) {
                        return self.log.last();
                    }
                }
                return None;
            }

            let pumped = tokio::select! {
                biased;
                message = self.inbox.recv() => Pumped::Message(message),
                changed = self.link.changed() => Pumped::LinkChanged(changed.is_ok()),
            };

            match pumped {
                Pumped::Message(Some(message)) => {
                    if self.append_inbound(message) {
                        return self.log.last();
                    }
                }
                Pumped::Message(None) => {
                    self.mark_disconnected("inbound channel closed");
                }
                Pumped::LinkChanged(true) => self.sync_link(),
                Pumped::LinkChanged(false) => {
                    self.mark_disconnected("transport went away");
                }
            }
        }
    }

    /// Append every inbound message already queued, without waiting
    ///
    /// Returns the number of messages appended. Messages that arrived before
    /// the session disconnected are still appended.
    pub fn drain_inbound(&mut self) -> usize {
        let mut appended = 0;
        while let Ok(message) = self.inbox.try_recv() {
            if self.append_inbound(message) {
                appended += 1;
            }
        }
        self.sync_link();
        appended
    }

    /// Tear the session down
    ///
    /// Disconnects the transport and moves to `Disconnected` for good. The log
    /// stays readable until the session is dropped.
    pub async fn close(&mut self) {
        self.release_subscription();
        if self.transport.is_connected() {
            if let Err(err) = self.transport.disconnect().await {
                warn!(client_id = %self.client_id, "Error while disconnecting: {}", err);
            }
        }
        if self.state != SessionState::Disconnected {
            info!(client_id = %self.client_id, messages = self.log.len(), "Chat session closed");
            self.set_state(SessionState::Disconnected);
        }
    }

    // ------------------------------------------------------------------------
    // Internal Helpers
    // ------------------------------------------------------------------------

    fn set_state(&mut self, next: SessionState) {
        if self.state == SessionState::Disconnected {
            return;
        }
        debug!(client_id = %self.client_id, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }

    /// Fold the transport's link state into the session state
    fn sync_link(&mut self) {
        if self.state != SessionState::Connected {
            return;
        }
        let link = self.link.borrow_and_update().clone();
        match link {
            LinkState::Up => {}
            LinkState::Down => self.mark_disconnected("transport closed"),
            LinkState::Dropped { reason } => self.mark_disconnected(&reason),
        }
    }

    fn mark_disconnected(&mut self, reason: &str) {
        if self.state == SessionState::Disconnected {
            return;
        }
        warn!(client_id = %self.client_id, "Chat session lost its connection: {}", reason);
        self.release_subscription();
        self.set_state(SessionState::Disconnected);
    }

    fn release_subscription(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.transport.unsubscribe(id);
        }
    }
}

impl<T: SessionTransport> fmt::Debug for ChatSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("client_id", &self.client_id)
            .field("state", &self.state)
            .field("messages", &self.log.len())
            .finish()
    }
}
