//! OpenAI Realtime API configuration types.
//!
//! This module contains the static choices made once at startup:
//! - Wire schema variant (legacy beta events vs. the current GA shape)
//! - Turn detection mode
//! - Default endpoint, model, voice and temperature

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default realtime model.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Default voice identity.
pub const DEFAULT_VOICE: &str = "sage";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Model used to transcribe the caller's speech.
pub const INPUT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Telephony audio (G.711 u-law, 8kHz) in the legacy schema's naming.
pub const LEGACY_TELEPHONY_AUDIO_FORMAT: &str = "g711_ulaw";

/// Telephony audio (G.711 u-law, 8kHz) in the current schema's naming.
pub const TELEPHONY_AUDIO_MIME: &str = "audio/pcmu";

/// Header that opts a connection into the legacy event schema.
pub const LEGACY_BETA_HEADER: (&str, &str) = ("openai-beta", "realtime=v1");

// =============================================================================
// Session Schema
// =============================================================================

/// Wire shape of the session negotiation, selected by configuration.
///
/// Both variants declare the same capabilities; only the JSON layout and
/// the connection headers differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSchema {
    /// Beta event schema, requires the `OpenAI-Beta: realtime=v1` header
    #[default]
    Legacy,
    /// Generally available schema
    #[serde(rename = "ga")]
    Current,
}

impl SessionSchema {
    /// Parse the `OPENAI_SESSION_SCHEMA` setting. Only `ga` selects the
    /// current schema; everything else stays on legacy.
    pub fn from_setting(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("ga") {
            Self::Current
        } else {
            Self::Legacy
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Current => "ga",
        }
    }
}

impl std::fmt::Display for SessionSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Turn Detection
// =============================================================================

/// Server-side voice activity detection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDetectionMode {
    /// Silence-based VAD
    ServerVad,
    /// Semantic end-of-turn detection
    #[default]
    SemanticVad,
}

impl TurnDetectionMode {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerVad => "server_vad",
            Self::SemanticVad => "semantic_vad",
        }
    }

    /// Mode understood by the legacy schema, which has no semantic VAD.
    pub fn for_legacy(&self) -> Self {
        Self::ServerVad
    }
}

impl FromStr for TurnDetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "server_vad" => Ok(Self::ServerVad),
            "semantic_vad" => Ok(Self::SemanticVad),
            other => Err(format!(
                "unknown turn detection mode '{other}', expected server_vad or semantic_vad"
            )),
        }
    }
}

impl std::fmt::Display for TurnDetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
