//! OpenAI Realtime API module.
//!
//! This module speaks the OpenAI realtime protocol on behalf of one call:
//!
//! - Session negotiation in either the legacy (beta) or current (GA) shape
//! - Verbatim forwarding of G.711 u-law telephony audio
//! - Truncation of interrupted assistant speech
//! - Replies to the `end_call` function
//!
//! # Audio Format
//!
//! Both directions carry 8kHz G.711 u-law, base64-encoded, exactly as the
//! telephony leg produces and consumes it. No transcoding happens here.

mod client;
mod config;
mod messages;

pub use client::RealtimeSession;
pub use config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TEMPERATURE, DEFAULT_VOICE, INPUT_TRANSCRIPTION_MODEL,
    LEGACY_BETA_HEADER, OPENAI_REALTIME_URL, SessionSchema, TurnDetectionMode,
};
pub use messages::{
    ClientEvent, END_CALL_TOOL_NAME, OutputItem, ServerEvent, SessionIntent, ToolDef,
    current_session, legacy_session, parse_tool_arguments,
};
