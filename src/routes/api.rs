use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::calls;
use crate::state::AppState;
use std::sync::Arc;

/// Create the call API router
///
/// - `POST /calls` - place a call and hold the request until its transcript is ready
/// - `GET /calls/latest` - the most recently completed call
///
/// Both require `Authorization: Bearer <API secret>`; see
/// [`auth_middleware`](crate::middleware::auth_middleware).
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calls", post(calls::place_call_handler))
        .route("/calls/latest", get(calls::latest_call_handler))
        .layer(TraceLayer::new_for_http())
}
