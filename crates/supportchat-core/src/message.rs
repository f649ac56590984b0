//! Chat message model
//!
//! A `ChatMessage` is an immutable record of one entry in a session log.

use serde::{Deserialize, Serialize};

use crate::errors::{ChatError, Result};
use crate::types::{ClientId, MessageId, Origin, Timestamp};

// ----------------------------------------------------------------------------
// Chat Message
// ----------------------------------------------------------------------------

/// One chat entry exchanged within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MessageRecord", into = "MessageRecord")]
pub struct ChatMessage {
    id: MessageId,
    client_id: ClientId,
    content: String,
    timestamp: Timestamp,
    origin: Origin,
}

impl ChatMessage {
    /// Create a message from its parts, validating the content
    pub fn new(
        id: MessageId,
        client_id: ClientId,
        content: impl Into<String>,
        timestamp: Timestamp,
        origin: Origin,
    ) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ChatError::invalid_message("content must not be empty"));
        }

        Ok(Self {
            id,
            client_id,
            content,
            timestamp,
            origin,
        })
    }

    /// Create a locally authored message with a fresh id and the current time
    pub fn local(client_id: ClientId, content: impl Into<String>) -> Result<Self> {
        Self::new(
            MessageId::generate(),
            client_id,
            content,
            Timestamp::now(),
            Origin::Local,
        )
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Creation time on the author's clock
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }
}

/// Serialized form of a `ChatMessage`; deserialization goes through
/// `ChatMessage::new` so the content rules hold
#[derive(Serialize, Deserialize)]
struct MessageRecord {
    id: MessageId,
    client_id: ClientId,
    content: String,
    timestamp: Timestamp,
    origin: Origin,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = ChatError;

    fn try_from(record: MessageRecord) -> Result<Self> {
        ChatMessage::new(
            record.id,
            record.client_id,
            record.content,
            record.timestamp,
            record.origin,
        )
    }
}

impl From<ChatMessage> for MessageRecord {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            client_id: message.client_id,
            content: message.content,
            timestamp: message.timestamp,
            origin: message.origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientId {
        ClientId::new("C1").unwrap()
    }

    #[test]
    fn test_local_message_creation() {
        let msg = ChatMessage::local(client(), "hello").unwrap();

        assert_eq!(msg.content(), "hello");
        assert_eq!(msg.client_id().as_str(), "C1");
        assert_eq!(msg.origin(), Origin::Local);
        assert!(msg.is_local());
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(matches!(
            ChatMessage::local(client(), ""),
            Err(ChatError::InvalidMessage { .. })
        ));
        assert!(ChatMessage::local(client(), " \n\t").is_err());
    }

    #[test]
    fn test_remote_message_keeps_sender_timestamp() {
        let sent_at = Timestamp::new(1_700_000_000_000);
        let msg = ChatMessage::new(
            MessageId::generate(),
            client(),
            "hi there",
            sent_at,
            Origin::Remote,
        )
        .unwrap();

        assert_eq!(msg.timestamp(), sent_at);
        assert!(!msg.is_local());
    }

    #[test]
    fn test_deserialize_enforces_content_rules() {
        let msg = ChatMessage::local(client(), "hello").unwrap();
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(serde_json::from_str::<ChatMessage>(&json).unwrap(), msg);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["content"] = serde_json::Value::String("   ".to_string());
        assert!(serde_json::from_value::<ChatMessage>(value).is_err());
    }
}
