//! sb-api: HTTP surface of the SMS bridge
//!
//! Inbound SMS webhook, pull-mode poll endpoint and health check, on axum.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{router, start_server, AppState};
