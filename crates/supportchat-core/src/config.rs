//! Configuration for chat transports and sessions
//!
//! All values are injected when a transport or session is constructed; there is
//! no process-wide chat service. Durations serialize as whole milliseconds so
//! the structures can be written to and read from TOML.

use core::time::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{ChatError, Result};
use crate::types::ClientId;
use crate::wire::CLIENT_ID_PARAM;

// ----------------------------------------------------------------------------
// Duration Serialization Helpers
// ----------------------------------------------------------------------------

mod duration_ms {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

// ----------------------------------------------------------------------------
// Transport Configuration
// ----------------------------------------------------------------------------

/// Configuration for a network session transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Chat backend endpoint (`ws://` or `wss://`)
    pub endpoint: String,
    /// Maximum time allowed for the connection handshake
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Outbound frames that may be queued before `send` fails with
    /// `ChatError::Backpressure`
    pub outbound_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:3001/chat".to_string(),
            connect_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
        }
    }
}

impl TransportConfig {
    /// Create a configuration for the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Parse and check the configured endpoint
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ChatError::config(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ChatError::config(format!(
                "unsupported endpoint scheme: {}",
                other
            ))),
        }
    }

    /// Build the connect URL for a client, carrying the id as routing context
    ///
    /// Any query already present on the endpoint is preserved.
    pub fn session_url(&self, client_id: &ClientId) -> Result<Url> {
        let mut url = self.endpoint_url()?;
        url.query_pairs_mut()
            .append_pair(CLIENT_ID_PARAM, client_id.as_str());
        Ok(url)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        if self.connect_timeout.is_zero() {
            return Err(ChatError::config("connect timeout must be non-zero"));
        }
        if self.outbound_buffer == 0 {
            return Err(ChatError::config("outbound buffer must be non-zero"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Limits applied by the chat session controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum accepted length of outbound content, in bytes
    pub max_content_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_content_len: 4096,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_content_len == 0 {
            return Err(ChatError::config("max content length must be non-zero"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Combined Configuration
// ----------------------------------------------------------------------------

/// Complete chat configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub transport: TransportConfig,
    pub session: SessionConfig,
}

impl ChatConfig {
    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        self.session.validate()
    }
}
