use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use zeroize::Zeroizing;

use crate::auth::generate_secret;
use crate::config::ServerConfig;
use crate::core::bridge::BridgeSettings;
use crate::core::placement::{CallPlacer, TwilioCallPlacer, UnconfiguredPlacer};
use crate::core::tracker::CallTracker;

/// Application state shared by every handler.
pub struct AppState {
    pub config: ServerConfig,
    /// Process-wide call outcome registry
    pub tracker: Arc<CallTracker>,
    pub placer: Arc<dyn CallPlacer>,
    pub bridge_settings: Arc<BridgeSettings>,
    /// Bearer token the call API expects
    pub api_secret: Zeroizing<String>,
    /// Cancelled on process shutdown; live bridges wind down
    pub shutdown: CancellationToken,
    /// Live media stream bridges, drained on shutdown
    pub calls: TaskTracker,
}

/// Extra time on top of the end-call grace for both legs to close.
const SHUTDOWN_DRAIN_MARGIN: Duration = Duration::from_secs(3);

impl AppState {
    /// Build the state, placing calls through Twilio when it is configured.
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Arc<Self> {
        let placer: Arc<dyn CallPlacer> = match TwilioCallPlacer::new(config.twilio_settings()) {
            Ok(placer) => {
                tracing::info!(stream_url = %placer.stream_url(), "Call placement enabled");
                Arc::new(placer)
            }
            Err(e) => {
                tracing::warn!("Call placement disabled: {}", e);
                Arc::new(UnconfiguredPlacer::new(e.to_string()))
            }
        };

        Self::with_placer(config, placer, shutdown)
    }

    pub fn with_placer(
        config: ServerConfig,
        placer: Arc<dyn CallPlacer>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        if config.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; calls will end without an AI session");
        }

        let api_secret = match config.api_secret.clone() {
            Some(secret) => Zeroizing::new(secret),
            None => {
                tracing::warn!(
                    "API_SECRET not set; the HTTP call API is locked behind a generated secret"
                );
                Zeroizing::new(generate_secret())
            }
        };

        let bridge_settings = Arc::new(config.bridge_settings());
        Arc::new(Self {
            config,
            tracker: Arc::new(CallTracker::new()),
            placer,
            bridge_settings,
            api_secret,
            shutdown,
            calls: TaskTracker::new(),
        })
    }

    /// Wait for live calls to finish once shutdown has been requested.
    ///
    /// Each bridge plays out its end-call grace before closing, so the wait
    /// is bounded by that grace plus a margin.
    pub async fn drain_calls(&self) {
        self.calls.close();
        if self.calls.is_empty() {
            return;
        }

        let live = self.calls.len();
        tracing::info!(live, "Waiting for live calls to close");

        let limit = self.bridge_settings.end_call_grace + SHUTDOWN_DRAIN_MARGIN;
        if tokio::time::timeout(limit, self.calls.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.calls.len(),
                "Calls still open after shutdown grace"
            );
        }
    }
}
