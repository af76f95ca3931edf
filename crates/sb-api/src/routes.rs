//! Route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{health, incoming, outgoing};
use crate::server::AppState;

/// Create the bridge router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // SMS gateway webhook
        .route("/incoming", post(incoming))
        // Pull-mode poller
        .route("/outgoing", get(outgoing).post(outgoing).put(outgoing))
}
