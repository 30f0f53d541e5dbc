//! Call API
//!
//! `POST /calls` places an outbound call and holds the request open until the
//! bridge reports the finished transcript (or the wait times out).
//! `GET /calls/latest` returns the most recently completed call.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::core::call_state::ConversationMessage;
use crate::core::placement::{OutboundCallRequest, PlacementError};
use crate::core::tracker::TrackerError;
use crate::state::AppState;

/// Request body for `POST /calls`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCallRequest {
    /// Number to dial (E.164)
    pub to_number: String,
    /// Free-text context handed to the AI for this call
    #[serde(default)]
    pub call_context: String,
    /// Overrides the configured wait timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response body shared by both call endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallResultResponse {
    Completed {
        #[serde(rename = "callSid")]
        call_sid: String,
        transcript: Vec<ConversationMessage>,
    },
    Error {
        message: String,
    },
    NoCalls {
        transcript: Vec<ConversationMessage>,
    },
}

impl CallResultResponse {
    fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Error {
            message: format!("Call failed: {reason}"),
        }
    }
}

fn placement_status(err: &PlacementError) -> StatusCode {
    match err {
        PlacementError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn tracker_status(err: &TrackerError) -> StatusCode {
    match err {
        TrackerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        TrackerError::Superseded { .. } => StatusCode::CONFLICT,
    }
}

/// Place a call and wait for its transcript
pub async fn place_call_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlaceCallRequest>,
) -> Response {
    let (status, body) = place_and_await(&state, request).await;
    (status, Json(body)).into_response()
}

/// Place a call, then block until the bridge reports it or the wait expires.
///
/// Shared by the HTTP handler and the `call` subcommand.
pub async fn place_and_await(
    state: &AppState,
    request: PlaceCallRequest,
) -> (StatusCode, CallResultResponse) {
    let to_number = request.to_number.trim();
    if to_number.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            CallResultResponse::Error {
                message: "toNumber is required".to_string(),
            },
        );
    }

    let timeout = request
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(state.config.call_timeout);

    let outbound = OutboundCallRequest {
        to_number: to_number.to_string(),
        call_context: request.call_context,
    };

    let call_sid = match state.placer.place_call(&outbound).await {
        Ok(sid) => sid,
        Err(e) => {
            error!("Failed to place call: {}", e);
            return (placement_status(&e), CallResultResponse::failed(&e));
        }
    };

    info!(
        call_sid = %call_sid,
        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        "Call placed, awaiting transcript"
    );

    match state.tracker.wait_for_call(&call_sid, timeout).await {
        Ok(transcript) => (
            StatusCode::OK,
            CallResultResponse::Completed {
                call_sid,
                transcript,
            },
        ),
        Err(e) => {
            warn!(call_sid = %call_sid, "Call wait failed: {}", e);
            (tracker_status(&e), CallResultResponse::failed(&e))
        }
    }
}

/// Fetch the most recently completed call
pub async fn latest_call_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = match state.tracker.last_result() {
        Some(result) => CallResultResponse::Completed {
            call_sid: result.call_sid,
            transcript: result.transcript,
        },
        None => CallResultResponse::NoCalls {
            transcript: Vec::new(),
        },
    };

    Json(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: PlaceCallRequest =
            serde_json::from_value(json!({"toNumber": "+15550002"})).unwrap();
        assert_eq!(request.to_number, "+15550002");
        assert_eq!(request.call_context, "");
        assert_eq!(request.timeout_ms, None);

        let request: PlaceCallRequest = serde_json::from_value(json!({
            "toNumber": "+15550002",
            "callContext": "Book a table",
            "timeoutMs": 1000
        }))
        .unwrap();
        assert_eq!(request.call_context, "Book a table");
        assert_eq!(request.timeout_ms, Some(1000));
    }

    #[test]
    fn test_response_shapes() {
        let completed = CallResultResponse::Completed {
            call_sid: "CA1".to_string(),
            transcript: vec![ConversationMessage::user("hi")],
        };
        assert_eq!(
            serde_json::to_value(&completed).unwrap(),
            json!({
                "status": "completed",
                "callSid": "CA1",
                "transcript": [{"role": "user", "content": "hi"}]
            })
        );

        let none = CallResultResponse::NoCalls {
            transcript: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&none).unwrap(),
            json!({"status": "no_calls", "transcript": []})
        );

        let failed = CallResultResponse::failed("boom");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"status": "error", "message": "Call failed: boom"})
        );
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            placement_status(&PlacementError::NotConfigured("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            placement_status(&PlacementError::Rejected {
                status: 400,
                message: "bad".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            tracker_status(&TrackerError::Timeout {
                call_sid: "CA1".into(),
                timeout_ms: 10
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            tracker_status(&TrackerError::Superseded {
                call_sid: "CA1".into()
            }),
            StatusCode::CONFLICT
        );
    }
}
