//! Inbound event dispatch for the realtime leg.
//!
//! [`dispatch`] decodes one raw frame from the AI peer, applies its effect on
//! the [`CallState`] and tells the bridge what, if anything, to do next.
//! A frame that fails to decode is logged and dropped; it never ends the call.

use serde_json::{Map, Value};

use super::openai::{ServerEvent, parse_tool_arguments};
use crate::core::call_state::{CallState, Role, Truncation};

/// Action the bridge must take after an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCommand {
    /// Play this base64 audio payload to the caller
    ForwardAudio(String),
    /// Caller barged in; truncate the assistant item and clear playback
    Truncate(Truncation),
    /// The model invoked the end-of-call tool
    EndCall {
        /// Function call id, possibly empty
        call_id: String,
        /// Parsed arguments, empty when the argument string was malformed
        arguments: Map<String, Value>,
    },
}

/// Decode and route one inbound frame.
pub fn dispatch(raw: &str, state: &mut CallState) -> Option<BridgeCommand> {
    let event = match ServerEvent::decode(raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(call_sid = %state.call_sid, "Failed to parse server event: {}", e);
            return None;
        }
    };

    match event {
        ServerEvent::TranscriptionCompleted { transcript } => {
            if state.push_turn(Role::User, &transcript) {
                tracing::debug!(call_sid = %state.call_sid, "User transcript: {}", transcript);
            }
            None
        }

        ServerEvent::AudioTranscriptDone { transcript } => {
            if state.push_turn(Role::Assistant, &transcript) {
                tracing::debug!(call_sid = %state.call_sid, "Assistant transcript: {}", transcript);
            }
            None
        }

        ServerEvent::AudioDelta { delta, item_id } => {
            let payload = delta.filter(|d| !d.is_empty())?;
            if state.observe_assistant_audio(item_id.as_deref()) {
                tracing::trace!(
                    call_sid = %state.call_sid,
                    start_ms = state.latest_media_timestamp(),
                    "Assistant response started"
                );
            }
            Some(BridgeCommand::ForwardAudio(payload))
        }

        ServerEvent::OutputItemDone { item: Some(item) } if item.is_end_call() => {
            let arguments = parse_tool_arguments(item.arguments.as_ref());
            tracing::info!(call_sid = %state.call_sid, "Model requested end of call");
            Some(BridgeCommand::EndCall {
                call_id: item.call_id.unwrap_or_default(),
                arguments,
            })
        }

        ServerEvent::SpeechStarted { audio_start_ms } => {
            tracing::debug!(call_sid = %state.call_sid, ?audio_start_ms, "Caller speech started");
            let truncation = state.take_truncation()?;
            tracing::debug!(
                call_sid = %state.call_sid,
                item_id = %truncation.item_id,
                elapsed_ms = truncation.audio_end_ms,
                "Interrupting assistant response"
            );
            Some(BridgeCommand::Truncate(truncation))
        }

        ServerEvent::Error { error } => {
            tracing::error!(
                call_sid = %state.call_sid,
                "Realtime error: {} - {}",
                error.error_type,
                error.message
            );
            None
        }

        ServerEvent::SessionCreated { .. } => {
            tracing::info!(call_sid = %state.call_sid, "Realtime session created");
            None
        }

        ServerEvent::SessionUpdated { .. } => {
            tracing::debug!(call_sid = %state.call_sid, "Realtime session updated");
            None
        }

        ServerEvent::OutputItemDone { .. } | ServerEvent::Other => None,
    }
}
