//! OpenAI Realtime API WebSocket message types.
//!
//! This module defines the client and server event types the call bridge
//! exchanges with the realtime API. All events are JSON-encoded and sent
//! over WebSocket.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Negotiate the session (legacy or current shape)
//! - input_audio_buffer.append - Append caller audio to the buffer
//! - conversation.item.create - Reply to a function call
//! - conversation.item.truncate - Cut off assistant audio at a playback offset
//! - response.create - Ask the model to keep generating
//!
//! Server events (received from server):
//! - conversation.item.input_audio_transcription.completed - Caller turn transcript
//! - response.audio_transcript.done / response.output_audio_transcript.done - Assistant turn transcript
//! - response.audio.delta / response.output_audio.delta - Assistant audio chunk
//! - response.output_item.done - Output item finished (function calls)
//! - input_audio_buffer.speech_started - Caller started talking (barge-in)
//! - error, session.created, session.updated - Logged only
//!
//! Every other server event decodes to [`ServerEvent::Other`] and is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::config::{
    INPUT_TRANSCRIPTION_MODEL, LEGACY_TELEPHONY_AUDIO_FORMAT, SessionSchema,
    TELEPHONY_AUDIO_MIME, TurnDetectionMode,
};

/// Name of the end-of-call tool advertised to the model.
pub const END_CALL_TOOL_NAME: &str = "end_call";

// =============================================================================
// Session Negotiation
// =============================================================================

/// Logical content of a session negotiation, independent of wire shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionIntent {
    pub instructions: String,
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    pub turn_detection: TurnDetectionMode,
}

/// Turn detection block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub mode: TurnDetectionMode,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    pub description: String,
    /// Function parameters JSON schema
    pub parameters: Value,
}

impl ToolDef {
    /// The single tool every call session advertises.
    pub fn end_call() -> Self {
        Self {
            tool_type: "function".to_string(),
            name: END_CALL_TOOL_NAME.to_string(),
            description: "End the active phone call when the conversation is complete or the callee requests to end.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Short reason for ending the call."
                    }
                },
                "additionalProperties": false
            }),
        }
    }
}

/// Session body in the legacy (beta) schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacySession {
    pub turn_detection: TurnDetection,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: Vec<String>,
    pub temperature: f32,
    pub input_audio_transcription: InputAudioTranscription,
    pub tools: Vec<ToolDef>,
    pub tool_choice: String,
}

/// Audio format block of the current schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioInput {
    pub format: AudioFormat,
    pub turn_detection: TurnDetection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioOutput {
    pub format: AudioFormat,
    pub voice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioConfig {
    pub input: AudioInput,
    pub output: AudioOutput,
}

/// Session body in the current (GA) schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentSession {
    #[serde(rename = "type")]
    pub session_type: String,
    pub model: String,
    pub output_modalities: Vec<String>,
    pub audio: AudioConfig,
    pub instructions: String,
    pub temperature: f32,
    pub input_audio_transcription: InputAudioTranscription,
    pub tools: Vec<ToolDef>,
    pub tool_choice: String,
}

/// Either session shape; serialized without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SessionPayload {
    Legacy(LegacySession),
    Current(CurrentSession),
}

/// Build the legacy session body.
pub fn legacy_session(intent: &SessionIntent) -> LegacySession {
    LegacySession {
        turn_detection: TurnDetection {
            mode: intent.turn_detection.for_legacy(),
        },
        input_audio_format: LEGACY_TELEPHONY_AUDIO_FORMAT.to_string(),
        output_audio_format: LEGACY_TELEPHONY_AUDIO_FORMAT.to_string(),
        voice: intent.voice.clone(),
        instructions: intent.instructions.clone(),
        modalities: vec!["text".to_string(), "audio".to_string()],
        temperature: intent.temperature,
        input_audio_transcription: InputAudioTranscription {
            model: INPUT_TRANSCRIPTION_MODEL.to_string(),
        },
        tools: vec![ToolDef::end_call()],
        tool_choice: "auto".to_string(),
    }
}

/// Build the current (GA) session body.
pub fn current_session(intent: &SessionIntent) -> CurrentSession {
    let format = || AudioFormat {
        mime: TELEPHONY_AUDIO_MIME.to_string(),
    };

    CurrentSession {
        session_type: "realtime".to_string(),
        model: intent.model.clone(),
        output_modalities: vec!["audio".to_string()],
        audio: AudioConfig {
            input: AudioInput {
                format: format(),
                turn_detection: TurnDetection {
                    mode: intent.turn_detection,
                },
            },
            output: AudioOutput {
                format: format(),
                voice: intent.voice.clone(),
            },
        },
        instructions: intent.instructions.clone(),
        temperature: intent.temperature,
        input_audio_transcription: InputAudioTranscription {
            model: INPUT_TRANSCRIPTION_MODEL.to_string(),
        },
        tools: vec![ToolDef::end_call()],
        tool_choice: "auto".to_string(),
    }
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Function call output item for `conversation.item.create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCallOutputItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub call_id: String,
    /// JSON-encoded tool output
    pub output: String,
}

/// Client events sent to the OpenAI Realtime API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Negotiate the session
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionPayload,
    },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio, forwarded verbatim
        audio: String,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: FunctionCallOutputItem,
    },

    /// Truncate a conversation item
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        /// Item ID
        item_id: String,
        /// Content index
        content_index: u32,
        /// Audio end in ms
        audio_end_ms: u64,
    },

    /// Create a response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Session negotiation in the configured wire shape.
    pub fn session_update(schema: SessionSchema, intent: &SessionIntent) -> Self {
        let session = match schema {
            SessionSchema::Legacy => SessionPayload::Legacy(legacy_session(intent)),
            SessionSchema::Current => SessionPayload::Current(current_session(intent)),
        };
        ClientEvent::SessionUpdate { session }
    }

    pub fn function_call_output(call_id: &str, output: &Value) -> Self {
        ClientEvent::ConversationItemCreate {
            item: FunctionCallOutputItem {
                item_type: "function_call_output".to_string(),
                call_id: call_id.to_string(),
                output: output.to_string(),
            },
        }
    }

    pub fn truncate(item_id: &str, audio_end_ms: u64) -> Self {
        ClientEvent::ConversationItemTruncate {
            item_id: item_id.to_string(),
            content_index: 0,
            audio_end_ms,
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// API error information.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error code
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

/// Output item carried by `response.output_item.done`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputItem {
    /// Item type ("message", "function_call", ...)
    #[serde(rename = "type")]
    pub item_type: String,
    /// Function name for function calls
    pub name: Option<String>,
    /// Call ID for function calls
    pub call_id: Option<String>,
    /// Raw function arguments; expected to be a JSON string
    pub arguments: Option<Value>,
}

impl OutputItem {
    /// Whether this item is an invocation of the end-of-call tool.
    pub fn is_end_call(&self) -> bool {
        self.item_type == "function_call" && self.name.as_deref() == Some(END_CALL_TOOL_NAME)
    }
}

/// Server events received from the OpenAI Realtime API.
///
/// Fields are defaulted so that a recognised event with missing fields
/// still decodes; unrecognised event kinds land in `Other`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },

    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Value,
    },

    /// Session updated
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: Value,
    },

    /// Caller speech transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },

    /// Assistant speech transcript completed
    #[serde(
        rename = "response.audio_transcript.done",
        alias = "response.output_audio_transcript.done"
    )]
    AudioTranscriptDone {
        #[serde(default)]
        transcript: String,
    },

    /// Assistant audio chunk
    #[serde(
        rename = "response.audio.delta",
        alias = "response.output_audio.delta"
    )]
    AudioDelta {
        /// Base64-encoded audio delta
        #[serde(default)]
        delta: Option<String>,
        /// Item the audio belongs to
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Output item done
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        item: Option<OutputItem>,
    },

    /// Speech started (VAD detected caller speech)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: Option<u64>,
    },

    /// Any event kind the bridge does not act on
    #[serde(other)]
    Other,
}

impl ServerEvent {
    /// Decode one raw text frame.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Parse a function call's argument string.
///
/// Anything other than a string holding a JSON object yields an empty map.
pub fn parse_tool_arguments(raw: Option<&Value>) -> Map<String, Value> {
    let Some(Value::String(text)) = raw else {
        return Map::new();
    };
    if text.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> SessionIntent {
        SessionIntent {
            instructions: "Call the restaurant.".to_string(),
            model: "gpt-realtime".to_string(),
            voice: "sage".to_string(),
            temperature: 0.8,
            turn_detection: TurnDetectionMode::SemanticVad,
        }
    }

    #[test]
    fn test_legacy_session_update_shape() {
        let event = ClientEvent::session_update(SessionSchema::Legacy, &intent());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "session.update");
        let session = &json["session"];
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["input_audio_format"], "g711_ulaw");
        assert_eq!(session["output_audio_format"], "g711_ulaw");
        assert_eq!(session["voice"], "sage");
        assert_eq!(session["modalities"], json!(["text", "audio"]));
        assert_eq!(session["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(session["tool_choice"], "auto");
        assert_eq!(session["tools"].as_array().unwrap().len(), 1);
        assert_eq!(session["tools"][0]["name"], "end_call");
        assert!(session.get("model").is_none());
    }

    #[test]
    fn test_current_session_update_shape() {
        let event = ClientEvent::session_update(SessionSchema::Current, &intent());
        let json = serde_json::to_value(&event).unwrap();

        let session = &json["session"];
        assert_eq!(session["type"], "realtime");
        assert_eq!(session["model"], "gpt-realtime");
        assert_eq!(session["output_modalities"], json!(["audio"]));
        assert_eq!(session["audio"]["input"]["format"]["type"], "audio/pcmu");
        assert_eq!(
            session["audio"]["input"]["turn_detection"]["type"],
            "semantic_vad"
        );
        assert_eq!(session["audio"]["output"]["voice"], "sage");
        assert_eq!(session["tools"][0]["type"], "function");
        assert_eq!(session["tool_choice"], "auto");
    }

    #[test]
    fn test_truncate_serialization() {
        let json = serde_json::to_value(ClientEvent::truncate("item_9", 1234)).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "conversation.item.truncate",
                "item_id": "item_9",
                "content_index": 0,
                "audio_end_ms": 1234
            })
        );
    }

    #[test]
    fn test_response_create_serialization() {
        let json = serde_json::to_string(&ClientEvent::ResponseCreate).unwrap();
        assert_eq!(json, r#"{"type":"response.create"}"#);
    }

    #[test]
    fn test_function_call_output_encodes_output_as_string() {
        let event = ClientEvent::function_call_output("call_1", &json!({"success": true}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["item"]["type"], "function_call_output");
        assert_eq!(json["item"]["call_id"], "call_1");
        assert_eq!(json["item"]["output"], r#"{"success":true}"#);
    }

    #[test]
    fn test_audio_delta_both_wire_names() {
        for kind in ["response.audio.delta", "response.output_audio.delta"] {
            let raw = format!(r#"{{"type":"{kind}","delta":"AAAA","item_id":"it_1"}}"#);
            assert_eq!(
                ServerEvent::decode(&raw).unwrap(),
                ServerEvent::AudioDelta {
                    delta: Some("AAAA".to_string()),
                    item_id: Some("it_1".to_string()),
                }
            );
        }
    }

    #[test]
    fn test_transcript_done_both_wire_names() {
        for kind in [
            "response.audio_transcript.done",
            "response.output_audio_transcript.done",
        ] {
            let raw = format!(r#"{{"type":"{kind}","transcript":"Hello","response_id":"r"}}"#);
            assert_eq!(
                ServerEvent::decode(&raw).unwrap(),
                ServerEvent::AudioTranscriptDone {
                    transcript: "Hello".to_string()
                }
            );
        }
    }

    #[test]
    fn test_unknown_event_is_other() {
        let event = ServerEvent::decode(r#"{"type":"rate_limits.updated","rate_limits":[]}"#);
        assert_eq!(event.unwrap(), ServerEvent::Other);
    }

    #[test]
    fn test_malformed_frame_is_error() {
        assert!(ServerEvent::decode(r#"{"type":"response.audio.delta","#).is_err());
        assert!(ServerEvent::decode(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn test_parse_tool_arguments() {
        let args = parse_tool_arguments(Some(&json!(r#"{"reason":"done"}"#)));
        assert_eq!(args.get("reason"), Some(&json!("done")));

        assert!(parse_tool_arguments(Some(&json!("{not json"))).is_empty());
        assert!(parse_tool_arguments(Some(&json!("[1,2]"))).is_empty());
        assert!(parse_tool_arguments(Some(&json!("   "))).is_empty());
        assert!(parse_tool_arguments(Some(&json!({"reason": "x"}))).is_empty());
        assert!(parse_tool_arguments(None).is_empty());
    }

    #[test]
    fn test_output_item_is_end_call() {
        let item = OutputItem {
            item_type: "function_call".to_string(),
            name: Some("end_call".to_string()),
            call_id: Some("c".to_string()),
            arguments: None,
        };
        assert!(item.is_end_call());

        let other = OutputItem {
            name: Some("lookup".to_string()),
            ..item.clone()
        };
        assert!(!other.is_end_call());

        let message = OutputItem {
            item_type: "message".to_string(),
            ..item
        };
        assert!(!message.is_end_call());
    }
}
