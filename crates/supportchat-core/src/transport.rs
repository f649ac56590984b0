//! Session transport abstraction
//!
//! A `SessionTransport` owns exactly one channel for one client identity and
//! translates between wire frames and `ChatMessage` values. Implementations
//! never reconnect on their own: a failed or dropped channel stays down until
//! the owner calls `connect` again.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use crate::errors::{ChatError, Result};
use crate::message::ChatMessage;
use crate::subscription::{InboundHandler, SubscriptionId};
use crate::types::ClientId;

pub mod local;

pub use local::{LocalPeer, LocalTransport};

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// One logical chat channel keyed by client identity
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Open the channel for `client_id`
    ///
    /// Fails with `ChatError::AlreadyConnected` if a channel is already open;
    /// the caller must disconnect first.
    async fn connect(&mut self, client_id: &ClientId) -> Result<()>;

    /// Close the channel if open; a no-op otherwise
    async fn disconnect(&mut self) -> Result<()>;

    /// Hand an outbound message to the channel
    ///
    /// Returns `ChatError::NotConnected` when no channel is open. The receipt
    /// resolves once the frame has been written to the network.
    async fn send(&mut self, message: &ChatMessage) -> Result<DeliveryReceipt>;

    /// Register a handler called once per inbound message, in receive order
    fn subscribe(&self, handler: InboundHandler) -> SubscriptionId;

    /// Remove a handler, returning whether it was registered
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Whether the channel is currently open
    fn is_connected(&self) -> bool;

    /// Watch channel tracking the link state
    fn link_state(&self) -> watch::Receiver<LinkState>;

    /// Client the channel is open for, if any
    fn client_id(&self) -> Option<ClientId>;
}

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Observable state of a transport channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No channel, either never opened or closed by the owner
    Down,
    /// Channel established locally
    Up,
    /// Channel lost without the owner asking for it
    Dropped { reason: String },
}

impl LinkState {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkState::Up)
    }
}

// ----------------------------------------------------------------------------
// Delivery Receipts
// ----------------------------------------------------------------------------

/// Completion handle for one outbound frame
///
/// Awaiting the receipt yields `Ok(())` once the frame was written, or the
/// error that prevented it. Dropping the receipt does not cancel the send.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<Result<()>>,
}

/// Producer side of a `DeliveryReceipt`, held by the transport
#[derive(Debug)]
pub struct DeliveryNotifier {
    tx: oneshot::Sender<Result<()>>,
}

impl DeliveryReceipt {
    /// Create a linked notifier/receipt pair
    pub fn pending() -> (DeliveryNotifier, DeliveryReceipt) {
        let (tx, rx) = oneshot::channel();
        (DeliveryNotifier { tx }, DeliveryReceipt { rx })
    }

    /// Create a receipt that is already resolved successfully
    pub fn delivered() -> Self {
        let (notifier, receipt) = Self::pending();
        notifier.complete(Ok(()));
        receipt
    }
}

impl DeliveryNotifier {
    /// Resolve the receipt; ignored if the receipt was dropped
    pub fn complete(self, result: Result<()>) {
        let _ = self.tx.send(result);
    }
}

impl Future for DeliveryReceipt {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Notifier dropped with the channel before the frame was written
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChatError::NotConnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}
