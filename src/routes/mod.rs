pub mod api;
pub mod telephony;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::handlers::api::health_check;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Assemble every route of the bridge server around `state`.
///
/// The call API sits behind the bearer secret. The media stream
/// authenticates through the secret carried in its `start` frame, and the
/// health check is public.
pub fn create_app(state: Arc<AppState>) -> Router {
    let protected_routes = api::create_api_router().layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ));

    Router::new()
        .route("/", get(health_check))
        .merge(protected_routes)
        .merge(telephony::create_telephony_router())
        .with_state(state)
}

/// Serve the app until shutdown is requested, then wait for live calls to
/// finish their grace and close.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let app = create_app(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(state.shutdown.clone().cancelled_owned())
        .await?;

    state.drain_calls().await;
    tracing::info!("Server stopped");
    Ok(())
}
