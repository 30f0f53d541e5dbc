//! Per-call bridge between the telephony leg and the realtime AI leg.
//!
//! A [`CallBridge`] runs one call through `CONNECTING -> ACTIVE -> ENDING ->
//! CLOSED`:
//!
//! - `CONNECTING`: waiting for the telephony `start` frame, then opening and
//!   negotiating the AI session. Caller audio is not forwarded yet.
//! - `ACTIVE`: audio flows both ways, the transcript accumulates and barge-in
//!   truncation is live.
//! - `ENDING`: the model called `end_call` or shutdown was requested. Traffic
//!   keeps flowing for the grace period so the closing line can play out.
//! - `CLOSED`: both legs closed and the transcript handed to the tracker,
//!   exactly once.
//!
//! A disconnect or error on either leg skips the grace period and closes
//! straight away with whatever transcript exists.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::auth::{generate_secret, secrets_match};
use crate::core::call_state::{CallState, ConversationMessage};
use crate::core::prompts::outbound_call_instructions;
use crate::core::realtime::{
    BridgeCommand, RealtimeSession, RealtimeSessionConfig, SessionSignal, dispatch,
};
use crate::core::telephony::{StreamStart, TelephonyEvent, TelephonyLeg};
use crate::core::tracker::CallTracker;

/// Default delay between `end_call` and closing both legs.
pub const DEFAULT_END_CALL_GRACE: Duration = Duration::from_millis(5000);

/// Stand-in deadline for the grace timer while it is not armed.
const DISARMED: Duration = Duration::from_secs(86_400 * 365);

/// Lifecycle phase of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Connecting,
    Active,
    Ending,
    Closed,
}

impl std::fmt::Display for CallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallPhase::Connecting => write!(f, "CONNECTING"),
            CallPhase::Active => write!(f, "ACTIVE"),
            CallPhase::Ending => write!(f, "ENDING"),
            CallPhase::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The model invoked `end_call`
    EndCallTool,
    /// Telephony sent `stop`
    TelephonyStopped,
    /// Telephony socket went away
    TelephonyDisconnected,
    /// AI socket reported an error
    RealtimeError,
    /// AI socket closed
    RealtimeClosed,
    /// The AI session could not be opened or negotiated
    RealtimeUnavailable,
    /// The `start` frame carried a wrong stream secret or no call id
    Rejected,
    /// Process shutdown
    Shutdown,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndReason::EndCallTool => "end_call_tool",
            EndReason::TelephonyStopped => "telephony_stopped",
            EndReason::TelephonyDisconnected => "telephony_disconnected",
            EndReason::RealtimeError => "realtime_error",
            EndReason::RealtimeClosed => "realtime_closed",
            EndReason::RealtimeUnavailable => "realtime_unavailable",
            EndReason::Rejected => "rejected",
            EndReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Settings shared by every bridge in the process.
#[derive(Clone)]
pub struct BridgeSettings {
    pub realtime: RealtimeSessionConfig,
    pub end_call_grace: Duration,
    /// Every `start` frame must carry this as its `streamSecret` parameter
    pub stream_secret: Zeroizing<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            realtime: RealtimeSessionConfig::default(),
            end_call_grace: DEFAULT_END_CALL_GRACE,
            stream_secret: Zeroizing::new(generate_secret()),
        }
    }
}

impl std::fmt::Debug for BridgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSettings")
            .field("realtime", &self.realtime)
            .field("end_call_grace", &self.end_call_grace)
            .field("stream_secret", &"[REDACTED]")
            .finish()
    }
}

/// Result of one bridged call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutcome {
    /// `None` when the telephony leg never sent `start`
    pub call_sid: Option<String>,
    pub transcript: Vec<ConversationMessage>,
    pub reason: EndReason,
}

/// Orchestrates one call.
pub struct CallBridge {
    settings: Arc<BridgeSettings>,
    tracker: Arc<CallTracker>,
    shutdown: CancellationToken,
    phase: CallPhase,
}

impl CallBridge {
    pub fn new(
        settings: Arc<BridgeSettings>,
        tracker: Arc<CallTracker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            tracker,
            shutdown,
            phase: CallPhase::Connecting,
        }
    }

    fn transition(&mut self, next: CallPhase, call_sid: &str) {
        if self.phase == next {
            return;
        }
        tracing::info!(call_sid, from = %self.phase, phase = %next, "Call phase transition");
        self.phase = next;
    }

    /// Run the call to completion.
    ///
    /// `inbound` carries raw text frames from the telephony socket and closes
    /// when that socket does; `telephony` queues frames for its writer.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<String>,
        mut telephony: TelephonyLeg,
    ) -> BridgeOutcome {
        let shutdown = self.shutdown.clone();

        // CONNECTING: wait for the stream to start.
        let secret = self.settings.stream_secret.clone();
        let start = match Self::await_start(&mut inbound, &shutdown, &secret).await {
            Ok(start) => start,
            Err(reason) => {
                tracing::info!(%reason, "Telephony stream ended before start");
                telephony.close().await;
                self.phase = CallPhase::Closed;
                return BridgeOutcome {
                    call_sid: None,
                    transcript: Vec::new(),
                    reason,
                };
            }
        };

        let params = start.custom_parameters;
        let mut state = CallState::new(
            start.call_sid,
            start.stream_sid,
            params.from_number,
            params.to_number,
            params.call_context,
        );
        telephony.set_stream_sid(state.stream_sid.clone());

        tracing::info!(
            call_sid = %state.call_sid,
            stream_sid = %state.stream_sid,
            "Telephony stream started"
        );

        // CONNECTING: open the AI leg, draining telephony frames meanwhile.
        let settings = self.settings.clone();
        let connected = {
            let connect = RealtimeSession::connect(&settings.realtime);
            tokio::pin!(connect);

            loop {
                tokio::select! {
                    result = &mut connect => break Ok(result),
                    frame = inbound.recv() => match frame {
                        Some(raw) => {
                            if let Some(reason) =
                                Self::on_telephony_frame(&raw, &mut state, None).await
                            {
                                break Err(reason);
                            }
                        }
                        None => break Err(EndReason::TelephonyDisconnected),
                    },
                    _ = shutdown.cancelled() => break Err(EndReason::Shutdown),
                }
            }
        };

        let (session, mut signals) = match connected {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::error!(call_sid = %state.call_sid, "Failed to open realtime session: {}", e);
                return self
                    .finish(state, None, &telephony, EndReason::RealtimeUnavailable)
                    .await;
            }
            Err(reason) => return self.finish(state, None, &telephony, reason).await,
        };

        let instructions = outbound_call_instructions(&state);
        if let Err(e) = session.negotiate_session(&instructions).await {
            tracing::error!(call_sid = %state.call_sid, "Failed to negotiate realtime session: {}", e);
            return self
                .finish(state, Some(&session), &telephony, EndReason::RealtimeUnavailable)
                .await;
        }

        self.transition(CallPhase::Active, &state.call_sid);

        // ACTIVE / ENDING
        let grace = tokio::time::sleep(DISARMED);
        tokio::pin!(grace);
        let mut ending: Option<EndReason> = None;

        let reason = loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(raw) => {
                        if let Some(reason) =
                            Self::on_telephony_frame(&raw, &mut state, Some(&session)).await
                        {
                            break ending.unwrap_or(reason);
                        }
                    }
                    None => break ending.unwrap_or(EndReason::TelephonyDisconnected),
                },

                signal = signals.recv() => match signal {
                    Some(SessionSignal::Message(raw)) => match dispatch(&raw, &mut state) {
                        Some(BridgeCommand::ForwardAudio(payload)) => {
                            telephony.send_media(payload).await;
                        }
                        Some(BridgeCommand::Truncate(truncation)) => {
                            session
                                .send_truncate(&truncation.item_id, truncation.audio_end_ms)
                                .await;
                            telephony.clear().await;
                        }
                        Some(BridgeCommand::EndCall { call_id, arguments }) => {
                            let output = end_call_output(&arguments);
                            session.send_tool_result(&call_id, &output).await;

                            if ending.is_none() {
                                ending = Some(EndReason::EndCallTool);
                                self.transition(CallPhase::Ending, &state.call_sid);
                                grace.as_mut().reset(Instant::now() + self.settings.end_call_grace);
                            }
                        }
                        None => {}
                    },
                    Some(SessionSignal::Error(e)) => {
                        tracing::warn!(call_sid = %state.call_sid, "Realtime leg error: {}", e);
                        break ending.unwrap_or(EndReason::RealtimeError);
                    }
                    Some(SessionSignal::Closed) | None => {
                        break ending.unwrap_or(EndReason::RealtimeClosed);
                    }
                },

                _ = shutdown.cancelled(), if ending.is_none() => {
                    ending = Some(EndReason::Shutdown);
                    self.transition(CallPhase::Ending, &state.call_sid);
                    grace.as_mut().reset(Instant::now() + self.settings.end_call_grace);
                }

                _ = &mut grace, if ending.is_some() => {
                    break ending.unwrap_or(EndReason::EndCallTool);
                }
            }
        };

        self.finish(state, Some(&session), &telephony, reason).await
    }

    /// Consume frames until `start`; anything else before it is dropped.
    ///
    /// A `start` without the stream secret or without a call id ends the
    /// stream before the AI leg is opened or the tracker is touched.
    async fn await_start(
        inbound: &mut mpsc::Receiver<String>,
        shutdown: &CancellationToken,
        secret: &str,
    ) -> Result<StreamStart, EndReason> {
        loop {
            let raw = tokio::select! {
                frame = inbound.recv() => frame.ok_or(EndReason::TelephonyDisconnected)?,
                _ = shutdown.cancelled() => return Err(EndReason::Shutdown),
            };

            match TelephonyEvent::decode(&raw) {
                Ok(TelephonyEvent::Start { start }) => {
                    if !secrets_match(&start.custom_parameters.stream_secret, secret) {
                        tracing::warn!(
                            call_sid = %start.call_sid,
                            "Rejecting media stream: invalid stream secret"
                        );
                        return Err(EndReason::Rejected);
                    }
                    if start.call_sid.trim().is_empty() {
                        tracing::warn!(
                            stream_sid = %start.stream_sid,
                            "Rejecting media stream: start frame has no call id"
                        );
                        return Err(EndReason::Rejected);
                    }
                    return Ok(start);
                }
                Ok(TelephonyEvent::Stop) => return Err(EndReason::TelephonyStopped),
                Ok(TelephonyEvent::Connected { protocol }) => {
                    tracing::debug!(?protocol, "Telephony stream connected");
                }
                Ok(_) => tracing::trace!("Dropping frame received before start"),
                Err(e) => tracing::warn!("Failed to parse telephony frame: {}", e),
            }
        }
    }

    /// Apply one telephony frame. Returns a reason when the leg has stopped.
    async fn on_telephony_frame(
        raw: &str,
        state: &mut CallState,
        session: Option<&RealtimeSession>,
    ) -> Option<EndReason> {
        match TelephonyEvent::decode(raw) {
            Ok(TelephonyEvent::Media { media }) => {
                state.observe_media_timestamp(media.timestamp);
                if let Some(session) = session {
                    session.send_audio(media.payload).await;
                }
                None
            }
            Ok(TelephonyEvent::Stop) => {
                tracing::info!(call_sid = %state.call_sid, "Telephony stream stopped");
                Some(EndReason::TelephonyStopped)
            }
            Ok(TelephonyEvent::Mark { mark }) => {
                tracing::trace!(call_sid = %state.call_sid, name = %mark.name, "Playback mark");
                None
            }
            Ok(TelephonyEvent::Start { .. }) => {
                tracing::debug!(call_sid = %state.call_sid, "Ignoring repeated start frame");
                None
            }
            Ok(TelephonyEvent::Connected { .. } | TelephonyEvent::Other) => None,
            Err(e) => {
                tracing::warn!(call_sid = %state.call_sid, "Failed to parse telephony frame: {}", e);
                None
            }
        }
    }

    /// Close both legs and report the transcript. Consumes the bridge so it
    /// runs once per call.
    async fn finish(
        mut self,
        state: CallState,
        session: Option<&RealtimeSession>,
        telephony: &TelephonyLeg,
        reason: EndReason,
    ) -> BridgeOutcome {
        self.transition(CallPhase::Ending, &state.call_sid);

        if let Some(session) = session {
            session.close().await;
        }
        telephony.close().await;

        self.transition(CallPhase::Closed, &state.call_sid);

        let call_sid = state.call_sid.clone();
        let transcript = state.into_transcript();
        tracing::info!(
            call_sid = %call_sid,
            turns = transcript.len(),
            %reason,
            "Call closed"
        );

        self.tracker.complete_call(&call_sid, transcript.clone());

        BridgeOutcome {
            call_sid: Some(call_sid),
            transcript,
            reason,
        }
    }
}

/// Tool output acknowledging `end_call`.
fn end_call_output(arguments: &Map<String, Value>) -> Value {
    let mut output = json!({ "success": true });
    if let Some(reason) = arguments.get("reason") {
        output["reason"] = reason.clone();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::telephony::TelephonyRoute;
    use serde_json::json;

    const SECRET: &str = "stream-token";

    fn start_frame_with(call_sid: Option<&str>, secret: &str) -> String {
        let mut start = json!({
            "streamSid": "MZ1",
            "customParameters": {
                "callContext": "ctx",
                "fromNumber": "+1",
                "toNumber": "+2",
                "streamSecret": secret
            }
        });
        if let Some(call_sid) = call_sid {
            start["callSid"] = json!(call_sid);
        }
        json!({"event": "start", "streamSid": "MZ1", "start": start}).to_string()
    }

    fn start_frame() -> String {
        start_frame_with(Some("CA1"), SECRET)
    }

    async fn unreachable_settings() -> BridgeSettings {
        BridgeSettings {
            realtime: RealtimeSessionConfig {
                url: unreachable_url().await,
                api_key: "sk-test".to_string().into(),
                ..Default::default()
            },
            end_call_grace: Duration::from_millis(10),
            stream_secret: SECRET.to_string().into(),
        }
    }

    async fn unreachable_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}/v1/realtime")
    }

    fn bridge(settings: BridgeSettings, tracker: Arc<CallTracker>) -> CallBridge {
        CallBridge::new(Arc::new(settings), tracker, CancellationToken::new())
    }

    #[test]
    fn test_end_call_output() {
        assert_eq!(end_call_output(&Map::new()), json!({"success": true}));

        let mut args = Map::new();
        args.insert("reason".to_string(), json!("booked"));
        assert_eq!(
            end_call_output(&args),
            json!({"success": true, "reason": "booked"})
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(CallPhase::Connecting.to_string(), "CONNECTING");
        assert_eq!(CallPhase::Closed.to_string(), "CLOSED");
        assert_eq!(EndReason::EndCallTool.to_string(), "end_call_tool");
    }

    #[tokio::test]
    async fn test_stop_before_start_is_not_reported() {
        let tracker = Arc::new(CallTracker::new());
        let (frames_tx, frames_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        frames_tx
            .send(r#"{"event":"media","media":{"timestamp":"20","payload":"AA=="}}"#.to_string())
            .await
            .unwrap();
        frames_tx
            .send(r#"{"event":"stop"}"#.to_string())
            .await
            .unwrap();

        let outcome = bridge(BridgeSettings::default(), tracker.clone())
            .run(frames_rx, TelephonyLeg::new(out_tx))
            .await;

        assert_eq!(outcome.call_sid, None);
        assert_eq!(outcome.reason, EndReason::TelephonyStopped);
        assert!(tracker.last_result().is_none());
        assert_eq!(out_rx.recv().await, Some(TelephonyRoute::Close));
    }

    #[tokio::test]
    async fn test_unavailable_realtime_reports_empty_transcript() {
        let tracker = Arc::new(CallTracker::new());
        let settings = unreachable_settings().await;

        let wait = tracker.wait_for_call("CA1", Duration::from_secs(5));

        let (frames_tx, frames_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        frames_tx.send(start_frame()).await.unwrap();

        let outcome = bridge(settings, tracker.clone())
            .run(frames_rx, TelephonyLeg::new(out_tx))
            .await;

        assert_eq!(outcome.call_sid.as_deref(), Some("CA1"));
        assert_eq!(outcome.reason, EndReason::RealtimeUnavailable);
        assert!(wait.await.unwrap().is_empty());
        assert_eq!(out_rx.recv().await, Some(TelephonyRoute::Close));
    }

    #[tokio::test]
    async fn test_start_with_wrong_secret_is_rejected() {
        let tracker = Arc::new(CallTracker::new());
        let _wait = tracker.wait_for_call("CA1", Duration::from_secs(5));

        for secret in ["forged", ""] {
            let (frames_tx, frames_rx) = mpsc::channel(8);
            let (out_tx, mut out_rx) = mpsc::channel(8);
            frames_tx
                .send(start_frame_with(Some("CA1"), secret))
                .await
                .unwrap();
            frames_tx
                .send(r#"{"event":"stop"}"#.to_string())
                .await
                .unwrap();

            // An unreachable AI peer would end as RealtimeUnavailable if it were dialed
            let outcome = bridge(unreachable_settings().await, tracker.clone())
                .run(frames_rx, TelephonyLeg::new(out_tx))
                .await;

            assert_eq!(outcome.reason, EndReason::Rejected, "secret={secret:?}");
            assert_eq!(outcome.call_sid, None);
            assert_eq!(out_rx.recv().await, Some(TelephonyRoute::Close));
        }

        assert!(tracker.is_pending("CA1"));
        assert!(tracker.last_result().is_none());
    }

    #[tokio::test]
    async fn test_start_without_call_sid_is_not_reported() {
        let tracker = Arc::new(CallTracker::new());
        let (frames_tx, frames_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        frames_tx
            .send(start_frame_with(None, SECRET))
            .await
            .unwrap();

        let outcome = bridge(unreachable_settings().await, tracker.clone())
            .run(frames_rx, TelephonyLeg::new(out_tx))
            .await;

        assert_eq!(outcome.reason, EndReason::Rejected);
        assert_eq!(outcome.call_sid, None);
        assert!(tracker.last_result().is_none());
        assert_eq!(out_rx.recv().await, Some(TelephonyRoute::Close));
    }

    #[test]
    fn test_settings_debug_redacts_secret() {
        let settings = BridgeSettings {
            stream_secret: SECRET.to_string().into(),
            ..Default::default()
        };
        assert!(!format!("{settings:?}").contains(SECRET));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let tracker = Arc::new(CallTracker::new());
        let shutdown = CancellationToken::new();
        let (_frames_tx, frames_rx) = mpsc::channel::<String>(8);
        let (out_tx, _out_rx) = mpsc::channel(8);

        shutdown.cancel();
        let outcome = CallBridge::new(Arc::new(BridgeSettings::default()), tracker, shutdown)
            .run(frames_rx, TelephonyLeg::new(out_tx))
            .await;

        assert_eq!(outcome.reason, EndReason::Shutdown);
        assert_eq!(outcome.call_sid, None);
    }
}
