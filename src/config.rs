//! Session configuration
//!
//! Tunables for the session layer with sensible defaults. Environment
//! overrides are read by [`SessionConfig::from_env`].

use {
    serde::{Deserialize, Serialize},
    tracing::warn,
};

/// Protocol versions accepted during the handshake, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 2] = ["2025-03-26", "2025-06-18"];

/// Configuration for the session layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Logger name attached to log notifications when the caller gives none
    pub default_logger: Option<String>,

    /// Protocol versions accepted in the handshake, oldest first
    pub supported_protocol_versions: Vec<String>,

    /// Log notification text longer than this is truncated before sending
    pub max_log_message_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_logger: None,
            supported_protocol_versions: SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
            max_log_message_bytes: 64 * 1024, // 64KB
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `SOLIDCTX_DEFAULT_LOGGER` and
    /// `SOLIDCTX_MAX_LOG_MESSAGE_BYTES`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(logger) = std::env::var("SOLIDCTX_DEFAULT_LOGGER") {
            if !logger.is_empty() {
                config.default_logger = Some(logger);
            }
        }

        if let Ok(raw) = std::env::var("SOLIDCTX_MAX_LOG_MESSAGE_BYTES") {
            match raw.parse::<usize>() {
                Ok(bytes) if bytes > 0 => config.max_log_message_bytes = bytes,
                _ => warn!(
                    "Ignoring invalid SOLIDCTX_MAX_LOG_MESSAGE_BYTES value: {:?}",
                    raw
                ),
            }
        }

        config
    }

    pub fn with_default_logger(mut self, logger: impl Into<String>) -> Self {
        self.default_logger = Some(logger.into());
        self
    }

    pub fn with_max_log_message_bytes(mut self, bytes: usize) -> Self {
        self.max_log_message_bytes = bytes;
        self
    }

    /// The newest supported protocol version.
    pub fn latest_protocol_version(&self) -> &str {
        self.supported_protocol_versions
            .last()
            .map(String::as_str)
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[1])
    }

    pub fn supports_protocol_version(&self, version: &str) -> bool {
        self.supported_protocol_versions.iter().any(|v| v == version)
    }
}
