//! Telephony media-stream leg.
//!
//! The telephony provider streams call audio over a WebSocket as JSON frames
//! tagged by `event`. Inbound it sends `connected`, `start` (call metadata),
//! `media` (timestamped base64 u-law audio), `mark` and `stop`. Outbound the
//! bridge sends `media` to play audio and `clear` to flush queued playback;
//! both must carry the stream id received in `start`.

mod leg;
mod messages;

pub use leg::{TelephonyLeg, TelephonyRoute};
pub use messages::{
    InboundMedia, MarkPayload, OutboundFrame, OutboundMedia, StreamParameters, StreamStart,
    TelephonyEvent,
};
