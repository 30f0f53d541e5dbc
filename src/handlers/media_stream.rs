//! Telephony media stream WebSocket handler
//!
//! The telephony provider connects here once a placed call is answered.
//! Each connection gets its own [`CallBridge`]; the socket is split so that
//! a writer task drains frames queued by the bridge while a reader task
//! feeds inbound text frames to it.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::bridge::CallBridge;
use crate::core::telephony::{TelephonyLeg, TelephonyRoute};
use crate::state::AppState;

/// Channel buffer size for audio frames in either direction
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Time allowed for the writer to flush the close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Media stream WebSocket handler
///
/// Upgrades the HTTP connection to the telephony media stream.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Media stream connection upgrade requested");

    // Upgraded sockets outlive the HTTP server's own connection tracking
    let calls = state.calls.clone();
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| calls.track_future(handle_media_stream(socket, state)))
}

/// Bridge one telephony connection until the call ends.
async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "Media stream connection established");

    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<TelephonyRoute>(CHANNEL_BUFFER_SIZE);
    let (frame_tx, frame_rx) = mpsc::channel::<String>(CHANNEL_BUFFER_SIZE);

    // Writer task for outgoing frames
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let should_close = matches!(route, TelephonyRoute::Close);

            let result = match route {
                TelephonyRoute::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing frame: {}", e);
                        continue;
                    }
                },
                TelephonyRoute::Close => {
                    debug!("Closing media stream connection");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                debug!("Failed to send media stream frame: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    // Reader task for incoming frames
    let reader_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if frame_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Media stream closed by telephony provider");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Media stream error: {}", e);
                    break;
                }
            }
        }
    });

    let bridge = CallBridge::new(
        state.bridge_settings.clone(),
        state.tracker.clone(),
        state.shutdown.clone(),
    );
    let outcome = bridge.run(frame_rx, TelephonyLeg::new(route_tx)).await;

    info!(
        %connection_id,
        call_sid = ?outcome.call_sid,
        reason = %outcome.reason,
        turns = outcome.transcript.len(),
        "Media stream finished"
    );

    // Cleanup
    reader_task.abort();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sender_task)
        .await
        .is_err()
    {
        debug!(%connection_id, "Media stream writer did not drain in time");
    }
}
