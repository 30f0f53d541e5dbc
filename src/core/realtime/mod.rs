//! Realtime AI session leg.
//!
//! Two halves:
//!
//! - [`RealtimeSession`] encodes and sends client events over the WebSocket
//! - [`dispatcher`] decodes inbound server events and turns them into
//!   [`BridgeCommand`]s for the bridge, updating the call state on the way

mod base;
pub mod dispatcher;
pub mod openai;

pub use base::{
    ConnectionState, RealtimeError, RealtimeResult, RealtimeSessionConfig, SessionSignal,
};
pub use dispatcher::{BridgeCommand, dispatch};
pub use openai::{RealtimeSession, SessionSchema, TurnDetectionMode};
