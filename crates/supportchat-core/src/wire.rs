//! Wire format for chat events
//!
//! Frames are JSON text using an event envelope:
//!
//! ```json
//! {"event":"message","data":{"id":"…","clientId":"C1","content":"hello","timestamp":1700000000000}}
//! ```
//!
//! Inbound payloads are validated before they become a `ChatMessage`; anything
//! that does not parse is reported as `ChatError::MalformedPayload`.

use serde::{Deserialize, Serialize};

use crate::errors::{ChatError, Result};
use crate::message::ChatMessage;
use crate::types::{ClientId, MessageId, Origin, Timestamp};

/// Query parameter carrying the routing client id at connect time
pub const CLIENT_ID_PARAM: &str = "clientId";

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum WireEvent {
    Message(MessagePayload),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: Option<u64>,
}

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Encode an outbound message event
pub fn encode_outbound(message: &ChatMessage) -> Result<String> {
    let event = WireEvent::Message(MessagePayload {
        id: Some(message.id()),
        client_id: Some(message.client_id().to_string()),
        content: Some(message.content().to_string()),
        timestamp: Some(message.timestamp().as_millis()),
    });
    Ok(serde_json::to_string(&event)?)
}

/// Encode a message event as a backend would send it to a session
///
/// Used by in-process peers and test servers; `id` is optional because
/// backends are not required to assign one.
pub fn encode_inbound(
    id: Option<MessageId>,
    client_id: &ClientId,
    content: &str,
    timestamp: Timestamp,
) -> Result<String> {
    let event = WireEvent::Message(MessagePayload {
        id,
        client_id: Some(client_id.to_string()),
        content: Some(content.to_string()),
        timestamp: Some(timestamp.as_millis()),
    });
    Ok(serde_json::to_string(&event)?)
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Decode an inbound frame for the session owned by `session`
///
/// Inbound messages are always `Origin::Remote`. A missing id is replaced by a
/// freshly generated one; the sender's timestamp is kept untouched.
pub fn decode_inbound(frame: &str, session: &ClientId) -> Result<ChatMessage> {
    let WireEvent::Message(payload) =
        serde_json::from_str(frame).map_err(|e| ChatError::malformed(e.to_string()))?;

    if let Some(client_id) = payload.client_id.as_deref() {
        if client_id != session.as_str() {
            return Err(ChatError::malformed(format!(
                "message for client {} delivered to session {}",
                client_id, session
            )));
        }
    }

    let content = payload
        .content
        .ok_or_else(|| ChatError::malformed("missing content"))?;
    let timestamp = payload
        .timestamp
        .map(Timestamp::new)
        .ok_or_else(|| ChatError::malformed("missing timestamp"))?;
    let id = payload.id.unwrap_or_else(MessageId::generate);

    ChatMessage::new(id, session.clone(), content, timestamp, Origin::Remote)
        .map_err(|e| ChatError::malformed(e.to_string()))
}

/// Decode an outbound frame as written by a session
///
/// This is the backend's view of the wire and is what in-process peers use to
/// inspect what a session sent.
pub fn decode_outbound(frame: &str) -> Result<ChatMessage> {
    let WireEvent::Message(payload) =
        serde_json::from_str(frame).map_err(|e| ChatError::malformed(e.to_string()))?;

    let client_id = payload
        .client_id
        .ok_or_else(|| ChatError::malformed("missing clientId"))
        .and_then(|id| ClientId::new(id).map_err(|e| ChatError::malformed(e.to_string())))?;
    let id = payload
        .id
        .ok_or_else(|| ChatError::malformed("missing id"))?;
    let content = payload
        .content
        .ok_or_else(|| ChatError::malformed("missing content"))?;
    let timestamp = payload
        .timestamp
        .map(Timestamp::new)
        .ok_or_else(|| ChatError::malformed("missing timestamp"))?;

    ChatMessage::new(id, client_id, content, timestamp, Origin::Local)
        .map_err(|e| ChatError::malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ClientId {
        ClientId::new("C1").unwrap()
    }

    #[test]
    fn test_outbound_envelope_shape() {
        let msg = ChatMessage::local(session(), "hello").unwrap();
        let frame = encode_outbound(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["event"], "message");
        assert_eq!(value["data"]["clientId"], "C1");
        assert_eq!(value["data"]["content"], "hello");
        assert_eq!(value["data"]["timestamp"], msg.timestamp().as_millis());
        assert_eq!(value["data"]["id"], msg.id().to_string());
    }

    #[test]
    fn test_inbound_without_id_or_client() {
        let frame = r#"{"event":"message","data":{"content":"hi there","timestamp":42,"extra":true}}"#;
        let msg = decode_inbound(frame, &session()).unwrap();

        assert_eq!(msg.content(), "hi there");
        assert_eq!(msg.timestamp(), Timestamp::new(42));
        assert_eq!(msg.origin(), Origin::Remote);
        assert_eq!(msg.client_id(), &session());
    }

    #[test]
    fn test_inbound_keeps_supplied_id() {
        let id = MessageId::generate();
        let frame = encode_inbound(Some(id), &session(), "ok", Timestamp::new(7)).unwrap();
        assert_eq!(decode_inbound(&frame, &session()).unwrap().id(), id);
    }

    #[test]
    fn test_malformed_inbound_rejected() {
        let cases = [
            "not json",
            r#"{"event":"typing","data":{}}"#,
            r#"{"event":"message","data":{"timestamp":1}}"#,
            r#"{"event":"message","data":{"content":"","timestamp":1}}"#,
            r#"{"event":"message","data":{"content":"x"}}"#,
            r#"{"event":"message","data":{"content":"x","timestamp":-3}}"#,
            r#"{"event":"message","data":{"id":"bogus","content":"x","timestamp":1}}"#,
            r#"{"event":"message","data":{"clientId":"C2","content":"x","timestamp":1}}"#,
        ];

        for frame in cases {
            assert!(
                matches!(
                    decode_inbound(frame, &session()),
                    Err(ChatError::MalformedPayload { .. })
                ),
                "frame should be rejected: {}",
                frame
            );
        }
    }

    #[test]
    fn test_backend_view_of_outbound() {
        let msg = ChatMessage::local(session(), "hello").unwrap();
        let frame = encode_outbound(&msg).unwrap();
        assert_eq!(decode_outbound(&frame).unwrap(), msg);
    }
}
