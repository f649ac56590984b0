//! SupportChat Core
//!
//! This crate provides the messaging core of the live support chat: the message
//! model, the wire codec, the `SessionTransport` abstraction with an in-memory
//! implementation, and the `ChatSession` controller that owns a client's
//! ordered message log and connection state.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod message;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChatConfig, SessionConfig, TransportConfig};
pub use errors::{ChatError, Result};
pub use message::ChatMessage;
pub use session::{ChatSession, SendOutcome, SessionState};
pub use subscription::{InboundHandler, Subscribers, SubscriptionId};
pub use transport::{
    DeliveryNotifier, DeliveryReceipt, LinkState, LocalPeer, LocalTransport, SessionTransport,
};
pub use types::{ClientId, MessageId, Origin, Timestamp};
