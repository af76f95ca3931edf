//! HTTP server

use std::any::Any;
use std::net::SocketAddr;

use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use sb_core::{InboundBridge, PullQueue};

use crate::error::ApiError;
use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inbound: InboundBridge,
    /// Present in pull mode
    pub queue: Option<PullQueue>,
    /// Reject non-JSON webhook bodies with 415
    pub require_json: bool,
}

fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal("handler panicked".to_string()).into_response()
}

/// Build the router with logging and panic isolation
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
