//! Telephony media stream route
//!
//! The placed call's TwiML points the provider at this endpoint. Every
//! connection is bridged to its own realtime AI session.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::core::placement::MEDIA_STREAM_PATH;
use crate::handlers::media_stream::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the telephony WebSocket router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade for the telephony media stream
///
/// # Protocol
///
/// The provider sends JSON frames tagged by `event`: `connected`, `start`
/// (carrying the stream and call ids plus custom parameters), `media`
/// (base64 G.711 u-law audio), `mark` and `stop`.
///
/// The `start` frame must carry the process stream secret as its
/// `streamSecret` custom parameter. Streams without it are closed before
/// any AI session opens.
///
/// The server replies with `media` frames carrying assistant audio and
/// `clear` frames when the caller interrupts.
pub fn create_telephony_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
