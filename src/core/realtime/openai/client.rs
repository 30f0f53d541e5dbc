//! OpenAI Realtime API WebSocket session.
//!
//! A [`RealtimeSession`] owns one connection to the AI peer. The socket is
//! driven by a spawned task that serialises outbound [`ClientEvent`]s and
//! forwards every inbound text frame to the bridge as a
//! [`SessionSignal::Message`]. Decoding inbound frames is the dispatcher's
//! job, not this module's.
//!
//! Sends on a closed session are dropped silently: stale audio and control
//! frames have no value once the peer is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use super::config::{LEGACY_BETA_HEADER, SessionSchema, TurnDetectionMode};
use super::messages::{ClientEvent, SessionIntent};
use crate::core::realtime::base::{
    ConnectionState, RealtimeError, RealtimeResult, RealtimeSessionConfig, SessionSignal,
};

/// Channel capacity for outbound WebSocket events.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound signals delivered to the bridge.
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Commands for the connection task.
#[derive(Debug)]
enum Outbound {
    Event(ClientEvent),
    Close,
}

/// One open session with the AI peer.
pub struct RealtimeSession {
    schema: SessionSchema,
    model: String,
    voice: String,
    temperature: f32,
    turn_detection: TurnDetectionMode,

    /// WebSocket sender channel
    ws_sender: mpsc::Sender<Outbound>,
    /// Open flag, shared with the connection task
    open: Arc<AtomicBool>,
}

impl RealtimeSession {
    /// Open a connection to the AI peer.
    ///
    /// Returns the session handle and the receiver on which inbound frames
    /// and lifecycle signals arrive.
    pub async fn connect(
        config: &RealtimeSessionConfig,
    ) -> RealtimeResult<(Self, mpsc::Receiver<SessionSignal>)> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let url = build_ws_url(&config.url, &config.model)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.as_str()))
            .map_err(|_| {
                RealtimeError::AuthenticationFailed(
                    "API key contains characters not allowed in a header".to_string(),
                )
            })?;
        auth.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, auth);

        if config.schema == SessionSchema::Legacy {
            let (name, value) = LEGACY_BETA_HEADER;
            request
                .headers_mut()
                .insert(name, HeaderValue::from_static(value));
        }

        tracing::info!(
            host = url.host_str().unwrap_or_default(),
            model = %config.model,
            schema = %config.schema,
            "Connecting to realtime API"
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(response)
                    if response.status() == StatusCode::UNAUTHORIZED =>
                {
                    RealtimeError::AuthenticationFailed("credential rejected by peer".to_string())
                }
                other => RealtimeError::ConnectionFailed(other.to_string()),
            })?;

        tracing::info!("Connected to realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<Outbound>(WS_CHANNEL_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel::<SessionSignal>(SIGNAL_CHANNEL_CAPACITY);

        let open = Arc::new(AtomicBool::new(true));
        let task_open = open.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Handle outgoing messages
                    outbound = rx.recv() => match outbound {
                        Some(Outbound::Event(event)) => {
                            let json = match serde_json::to_string(&event) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize event: {}", e);
                                    continue;
                                }
                            };

                            if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                tracing::error!("Failed to send WebSocket message: {}", e);
                                let _ = signal_tx.send(SessionSignal::Error(e.to_string())).await;
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = ws_sink.send(Message::Close(None)).await;
                            let _ = ws_sink.close().await;
                            tracing::debug!("Realtime connection closed locally");
                            break;
                        }
                    },

                    // Handle incoming messages
                    inbound = ws_stream.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if signal_tx
                                .send(SessionSignal::Message(text.as_str().to_owned()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                tracing::error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "WebSocket closed by server");
                            let _ = signal_tx.send(SessionSignal::Closed).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            let _ = signal_tx.send(SessionSignal::Error(e.to_string())).await;
                            break;
                        }
                        None => {
                            let _ = signal_tx.send(SessionSignal::Closed).await;
                            break;
                        }
                    },
                }
            }

            task_open.store(false, Ordering::SeqCst);
        });

        Ok((
            Self {
                schema: config.schema,
                model: config.model.clone(),
                voice: config.voice.clone(),
                temperature: config.temperature,
                turn_detection: config.turn_detection,
                ws_sender: tx,
                open,
            },
            signal_rx,
        ))
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_open() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Send the one session negotiation message for this connection.
    pub async fn negotiate_session(&self, instructions: &str) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::WebSocketError(
                "session is not open".to_string(),
            ));
        }

        let intent = SessionIntent {
            instructions: instructions.to_string(),
            model: self.model.clone(),
            voice: self.voice.clone(),
            temperature: self.temperature,
            turn_detection: self.turn_detection,
        };

        tracing::debug!(schema = %self.schema, voice = %self.voice, "Negotiating realtime session");
        self.send_event(ClientEvent::session_update(self.schema, &intent))
            .await
    }

    /// Forward one inbound audio payload verbatim.
    pub async fn send_audio(&self, payload: String) {
        if !self.is_open() {
            tracing::trace!("Dropping audio frame, realtime session closed");
            return;
        }
        let _ = self
            .send_event(ClientEvent::InputAudioBufferAppend { audio: payload })
            .await;
    }

    /// Reply to a function call and ask the peer to continue.
    pub async fn send_tool_result(&self, call_id: &str, output: &Value) {
        if call_id.is_empty() || !self.is_open() {
            tracing::debug!("Skipping tool result: no call id or session closed");
            return;
        }
        if self
            .send_event(ClientEvent::function_call_output(call_id, output))
            .await
            .is_ok()
        {
            let _ = self.send_event(ClientEvent::ResponseCreate).await;
        }
    }

    /// Tell the peer the assistant item was cut off after `audio_end_ms`.
    pub async fn send_truncate(&self, item_id: &str, audio_end_ms: u64) {
        if !self.is_open() {
            return;
        }
        let _ = self
            .send_event(ClientEvent::truncate(item_id, audio_end_ms))
            .await;
    }

    /// Close the connection. Calling this more than once is harmless.
    pub async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.ws_sender.send(Outbound::Close).await;
            tracing::info!("Closing realtime session");
        }
    }

    /// Send an event to the WebSocket.
    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        self.ws_sender
            .send(Outbound::Event(event))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("schema", &self.schema)
            .field("model", &self.model)
            .field("state", &self.state())
            .finish()
    }
}

/// Build the WebSocket URL with the model query parameter.
fn build_ws_url(base: &str, model: &str) -> RealtimeResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("realtime url: {e}")))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(RealtimeError::InvalidConfiguration(format!(
            "realtime url must use ws or wss, got {}",
            url.scheme()
        )));
    }

    if !model.is_empty() {
        url.query_pairs_mut().append_pair("model", model);
    }
    Ok(url)
}

// =============================================================================
// Tests
// =============================================================================
