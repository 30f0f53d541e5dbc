pub mod bridge;
pub mod call_state;
pub mod placement;
pub mod prompts;
pub mod realtime;
pub mod telephony;
pub mod tracker;

// Re-export commonly used types for convenience
pub use bridge::{BridgeOutcome, BridgeSettings, CallBridge, CallPhase, EndReason};
pub use call_state::{CallState, ConversationMessage, Role, Truncation};
pub use placement::{
    CallPlacer, OutboundCallRequest, PlacementError, TwilioCallPlacer, TwilioSettings,
    UnconfiguredPlacer,
};
pub use realtime::{
    RealtimeError, RealtimeResult, RealtimeSession, RealtimeSessionConfig, SessionSchema,
    TurnDetectionMode,
};
pub use telephony::{TelephonyEvent, TelephonyLeg, TelephonyRoute};
pub use tracker::{CallResult, CallTracker, TrackerError};
