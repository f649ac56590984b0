//! SupportChat CLI Configuration
//!
//! Configuration is read from an optional TOML file and then adjusted by
//! command line flags. Missing sections and keys fall back to defaults.
//!
//! ```toml
//! [chat.transport]
//! endpoint = "wss://support.example.com/chat"
//! connect_timeout_ms = 5000
//!
//! [cli]
//! prompt = "> "
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use supportchat_core::ChatConfig;

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Transport and session settings
    pub chat: ChatConfig,
    /// Terminal behaviour
    pub cli: CliConfig,
}

/// Terminal-specific configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Prompt shown before user input
    pub prompt: String,
    /// Reply sent by the loopback agent
    pub loopback_reply: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "you> ".to_string(),
            loopback_reply: "Thanks for reaching out, an agent will be with you shortly.".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Result<Self> {
        if let Some(endpoint) = endpoint {
            self.chat.transport.endpoint = endpoint;
            self.validate()?;
        }
        Ok(self)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.chat
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        if self.cli.loopback_reply.trim().is_empty() {
            return Err(CliError::Config("loopback reply must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[chat.transport]\nendpoint = \"wss://support.example.com/chat\"\nconnect_timeout_ms = 1500"
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.chat.transport.endpoint, "wss://support.example.com/chat");
        assert_eq!(config.chat.transport.connect_timeout, Duration::from_millis(1500));
        assert_eq!(config.cli, CliConfig::default());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chat.transport]\nendpoint = \"ftp://nope\"").unwrap();

        assert!(matches!(
            AppConfig::load_from_file(file.path()),
            Err(CliError::Config(_))
        ));
        assert!(AppConfig::default()
            .with_endpoint(Some("not a url".to_string()))
            .is_err());
    }

    #[test]
    fn test_toml_output_loads_back() {
        let config = AppConfig::default()
            .with_endpoint(Some("ws://10.0.0.5:9000/chat".to_string()))
            .unwrap();
        let rendered = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
