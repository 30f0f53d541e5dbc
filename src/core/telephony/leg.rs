//! Outbound half of the telephony leg.

use tokio::sync::mpsc;

use super::messages::{OutboundFrame, OutboundMedia};

/// What the socket writer should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyRoute {
    /// Serialize and send this frame
    Frame(OutboundFrame),
    /// Close the socket
    Close,
}

/// Send primitives for the telephony socket.
///
/// The socket itself is owned by the connection handler; this handle only
/// queues frames for its writer task. Frames queued before the stream id is
/// known, or after the writer has gone, are dropped.
#[derive(Debug, Clone)]
pub struct TelephonyLeg {
    tx: mpsc::Sender<TelephonyRoute>,
    stream_sid: Option<String>,
}

impl TelephonyLeg {
    pub fn new(tx: mpsc::Sender<TelephonyRoute>) -> Self {
        Self {
            tx,
            stream_sid: None,
        }
    }

    /// Bind the stream id that every outbound frame must echo.
    pub fn set_stream_sid(&mut self, stream_sid: impl Into<String>) {
        self.stream_sid = Some(stream_sid.into());
    }

    /// Queue audio for playback to the caller.
    pub async fn send_media(&self, payload: String) {
        let Some(stream_sid) = self.stream_sid.clone() else {
            tracing::trace!("Dropping outbound media, no stream id yet");
            return;
        };
        self.route(TelephonyRoute::Frame(OutboundFrame::Media {
            stream_sid,
            media: OutboundMedia { payload },
        }))
        .await;
    }

    /// Flush any audio still queued on the provider side.
    pub async fn clear(&self) {
        let Some(stream_sid) = self.stream_sid.clone() else {
            return;
        };
        self.route(TelephonyRoute::Frame(OutboundFrame::Clear { stream_sid }))
            .await;
    }

    /// Ask the writer to close the socket.
    pub async fn close(&self) {
        self.route(TelephonyRoute::Close).await;
    }

    async fn route(&self, route: TelephonyRoute) {
        if self.tx.send(route).await.is_err() {
            tracing::trace!("Telephony writer gone, dropping frame");
        }
    }
}
