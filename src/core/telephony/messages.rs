//! Telephony media-stream frame types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Parameters attached to the stream when the call was placed.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamParameters {
    pub call_context: String,
    pub from_number: String,
    pub to_number: String,
    /// Proves the stream was set up by a call this process placed
    pub stream_secret: String,
}

impl std::fmt::Debug for StreamParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParameters")
            .field("call_context", &self.call_context)
            .field("from_number", &self.from_number)
            .field("to_number", &self.to_number)
            .field("stream_secret", &"[REDACTED]")
            .finish()
    }
}

/// Body of the `start` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    pub call_sid: String,
    pub custom_parameters: StreamParameters,
}

/// Body of an inbound `media` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InboundMedia {
    /// Milliseconds since the stream started
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
    /// Base64-encoded audio
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarkPayload {
    pub name: String,
}

/// Inbound frames from the telephony provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        start: StreamStart,
    },
    Media {
        media: InboundMedia,
    },
    Mark {
        #[serde(default)]
        mark: MarkPayload,
    },
    Stop,
    /// Frame kinds the bridge does not act on (e.g. `dtmf`)
    #[serde(other)]
    Other,
}

impl TelephonyEvent {
    /// Decode one raw text frame.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// The provider sends timestamps as decimal strings; accept numbers too.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().parse::<u64>().map_err(D::Error::custom),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("invalid media timestamp: {n}"))),
        Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("invalid media timestamp: {other}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Outbound frames sent to the telephony provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Play audio to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Drop any audio still queued for playback
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}
