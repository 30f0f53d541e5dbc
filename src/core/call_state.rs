//! Per-call mutable state.
//!
//! One `CallState` exists for every bridged call. It is owned by the
//! [`CallBridge`](crate::core::bridge::CallBridge) running that call and is
//! never shared between calls.
//!
//! Besides identifiers and the transcript, the state carries the
//! interruption bookkeeping used to truncate the assistant's in-flight
//! speech when the caller barges in:
//!
//! - `latest_media_timestamp` - last telephony media timestamp seen (ms)
//! - `response_start_timestamp` - telephony timestamp at which the current
//!   assistant response started playing, `None` when nothing is playing
//! - `last_assistant_item_id` - the assistant item a truncation would target

use serde::{Deserialize, Serialize};

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human on the phone
    User,
    /// The AI peer
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One completed turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A truncation the bridge must carry out after a barge-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Assistant item that was cut off
    pub item_id: String,
    /// How far into the item's playback the caller interrupted (ms)
    pub audio_end_ms: u64,
}

/// Mutable record describing one in-progress call.
#[derive(Debug, Clone, Default)]
pub struct CallState {
    /// Telephony call identifier (primary correlation key)
    pub call_sid: String,
    /// Telephony media stream identifier, echoed on every outbound frame
    pub stream_sid: String,
    pub from_number: String,
    pub to_number: String,
    /// Free-text context the call was placed with
    pub call_context: String,
    conversation_history: Vec<ConversationMessage>,
    latest_media_timestamp: u64,
    response_start_timestamp: Option<u64>,
    last_assistant_item_id: Option<String>,
}

impl CallState {
    pub fn new(
        call_sid: impl Into<String>,
        stream_sid: impl Into<String>,
        from_number: impl Into<String>,
        to_number: impl Into<String>,
        call_context: impl Into<String>,
    ) -> Self {
        Self {
            call_sid: call_sid.into(),
            stream_sid: stream_sid.into(),
            from_number: from_number.into(),
            to_number: to_number.into(),
            call_context: call_context.into(),
            ..Default::default()
        }
    }

    /// Transcript accumulated so far, in arrival order.
    pub fn conversation_history(&self) -> &[ConversationMessage] {
        &self.conversation_history
    }

    /// Consume the state, yielding the final transcript.
    pub fn into_transcript(self) -> Vec<ConversationMessage> {
        self.conversation_history
    }

    /// Append a turn. Empty text is skipped.
    pub fn push_turn(&mut self, role: Role, content: &str) -> bool {
        if content.is_empty() {
            return false;
        }
        self.conversation_history.push(ConversationMessage {
            role,
            content: content.to_string(),
        });
        true
    }

    pub fn latest_media_timestamp(&self) -> u64 {
        self.latest_media_timestamp
    }

    /// Record the timestamp of an inbound media frame. Never moves backwards.
    pub fn observe_media_timestamp(&mut self, timestamp: u64) {
        self.latest_media_timestamp = self.latest_media_timestamp.max(timestamp);
    }

    pub fn response_start_timestamp(&self) -> Option<u64> {
        self.response_start_timestamp
    }

    pub fn last_assistant_item_id(&self) -> Option<&str> {
        self.last_assistant_item_id.as_deref()
    }

    /// Whether assistant audio is currently being played to the caller.
    pub fn response_in_flight(&self) -> bool {
        self.response_start_timestamp.is_some()
    }

    /// Bookkeeping for one assistant audio delta.
    ///
    /// The first delta of a response opens the response window at the
    /// current media timestamp. Returns `true` when a new window was opened.
    pub fn observe_assistant_audio(&mut self, item_id: Option<&str>) -> bool {
        let opened = if self.response_start_timestamp.is_none() {
            self.response_start_timestamp = Some(self.latest_media_timestamp);
            true
        } else {
            false
        };

        if let Some(id) = item_id.filter(|id| !id.is_empty()) {
            self.last_assistant_item_id = Some(id.to_string());
        }

        opened
    }

    /// Plan a truncation for a barge-in and reset the response window.
    ///
    /// Returns `None`, leaving the state untouched, when there is no tracked
    /// assistant item or no response in flight.
    pub fn take_truncation(&mut self) -> Option<Truncation> {
        let start = self.response_start_timestamp?;
        let item_id = self.last_assistant_item_id.take()?;
        self.response_start_timestamp = None;

        Some(Truncation {
            item_id,
            audio_end_ms: self.latest_media_timestamp.saturating_sub(start),
        })
    }
}
