//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `calls` - Place a call and await its transcript, fetch the latest result
//! - `media_stream` - Telephony media stream WebSocket, one bridge per connection

pub mod api;
pub mod calls;
pub mod media_stream;

pub use calls::{latest_call_handler, place_call_handler};
pub use media_stream::media_stream_handler;
