//! Error types for the support chat core
//!
//! A single `ChatError` covers the transport, session and codec layers. Transport
//! failures are returned from `SessionTransport` calls; the session controller
//! absorbs them into its connection state instead of returning them.

use crate::types::ClientId;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Core error type for chat sessions and transports
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Connection failed for client {client_id}: {reason}")]
    Connection { client_id: ClientId, reason: String },

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Transport already connected for client {client_id}")]
    AlreadyConnected { client_id: ClientId },

    #[error("Outbound queue full ({capacity} frames pending)")]
    Backpressure { capacity: usize },

    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Invalid client id: must not be empty")]
    InvalidClientId,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ChatError {
    /// Create a connection error for a client
    pub fn connection<T: Into<String>>(client_id: &ClientId, reason: T) -> Self {
        ChatError::Connection {
            client_id: client_id.clone(),
            reason: reason.into(),
        }
    }

    /// Create a malformed payload error with a reason
    pub fn malformed<T: Into<String>>(reason: T) -> Self {
        ChatError::MalformedPayload {
            reason: reason.into(),
        }
    }

    /// Create an invalid message error with a reason
    pub fn invalid_message<T: Into<String>>(reason: T) -> Self {
        ChatError::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config<T: Into<String>>(reason: T) -> Self {
        ChatError::Config {
            reason: reason.into(),
        }
    }
}

/// Result alias used across the chat crates
pub type Result<T> = core::result::Result<T, ChatError>;
