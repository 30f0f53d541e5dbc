//! Base types for the AI realtime session leg.
//!
//! The bridge talks to exactly one kind of AI peer: a JSON-over-WebSocket
//! realtime session. This module holds the connection settings and error
//! types shared by the encoder ([`RealtimeSession`](super::RealtimeSession))
//! and the event dispatcher.

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

use super::openai::{OPENAI_REALTIME_URL, SessionSchema, TurnDetectionMode};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the realtime leg.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the AI peer failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the realtime leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, frames can be sent
    Open,
    /// Socket closed, either side
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Signals delivered from the realtime connection task to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// One raw text frame from the AI peer
    Message(String),
    /// Transport error; the connection is gone
    Error(String),
    /// The connection closed
    Closed,
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings for opening a realtime session.
///
/// `Debug` is implemented by hand; the credential is never printed.
#[derive(Clone)]
pub struct RealtimeSessionConfig {
    /// WebSocket endpoint (without the `model` query parameter)
    pub url: String,
    /// Bearer credential, wiped from memory on drop
    pub api_key: Zeroizing<String>,
    /// Model identifier
    pub model: String,
    /// Wire schema variant, fixed at startup
    pub schema: SessionSchema,
    /// Server-side turn detection mode
    pub turn_detection: TurnDetectionMode,
    /// Voice identity
    pub voice: String,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for RealtimeSessionConfig {
    fn default() -> Self {
        Self {
            url: OPENAI_REALTIME_URL.to_string(),
            api_key: Zeroizing::default(),
            model: super::openai::DEFAULT_REALTIME_MODEL.to_string(),
            schema: SessionSchema::default(),
            turn_detection: TurnDetectionMode::default(),
            voice: super::openai::DEFAULT_VOICE.to_string(),
            temperature: super::openai::DEFAULT_TEMPERATURE,
        }
    }
}

impl fmt::Debug for RealtimeSessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeSessionConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("schema", &self.schema)
            .field("turn_detection", &self.turn_detection)
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = RealtimeSessionConfig {
            api_key: "sk-very-secret".to_string().into(),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_default_config() {
        let config = RealtimeSessionConfig::default();
        assert_eq!(config.url, OPENAI_REALTIME_URL);
        assert_eq!(config.schema, SessionSchema::Legacy);
        assert_eq!(config.turn_detection, TurnDetectionMode::SemanticVad);
        assert_eq!(config.voice, "sage");
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
