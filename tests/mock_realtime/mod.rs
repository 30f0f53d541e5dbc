//! Scriptable mock of the realtime AI peer
//!
//! Accepts a single WebSocket connection, records the upgrade request
//! headers, forwards every client event to the test and sends whatever the
//! test scripts back to the bridge.

// Not every test binary uses every helper
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockRealtimePeer {
    /// `ws://` URL the bridge should connect to
    pub url: String,
    headers: Option<oneshot::Receiver<HeaderMap>>,
    to_client: mpsc::Sender<String>,
    from_client: mpsc::Receiver<Value>,
}

impl MockRealtimePeer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (headers_tx, headers_rx) = oneshot::channel();
        let (to_client, mut script) = mpsc::channel::<String>(64);
        let (events_tx, from_client) = mpsc::channel::<Value>(256);

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let callback = move |request: &Request, response: Response| {
                let _ = headers_tx.send(request.headers().clone());
                Ok::<Response, ErrorResponse>(response)
            };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    scripted = script.recv() => match scripted {
                        Some(text) => {
                            if write.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let event: Value = serde_json::from_str(text.as_str()).unwrap();
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            url: format!("ws://{addr}/v1/realtime"),
            headers: Some(headers_rx),
            to_client,
            from_client,
        }
    }

    /// Headers of the upgrade request.
    pub async fn handshake_headers(&mut self) -> HeaderMap {
        let rx = self.headers.take().expect("headers already taken");
        tokio::time::timeout(RECV_TIMEOUT, rx)
            .await
            .expect("no connection")
            .expect("handshake failed")
    }

    /// Send a server event to the bridge.
    pub async fn send(&self, event: Value) {
        self.to_client.send(event.to_string()).await.unwrap();
    }

    /// Next client event of the given type, skipping everything else.
    pub async fn expect_event(&mut self, event_type: &str) -> Value {
        loop {
            let event = tokio::time::timeout(RECV_TIMEOUT, self.from_client.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {event_type}"))
                .unwrap_or_else(|| panic!("connection closed before {event_type}"));
            if event["type"] == event_type {
                return event;
            }
        }
    }

    /// Wait until the bridge closes the connection; returns the events seen meanwhile.
    pub async fn closed(&mut self) -> Vec<Value> {
        let mut seen = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(RECV_TIMEOUT, self.from_client.recv()).await
        {
            seen.push(event);
        }
        seen
    }
}
