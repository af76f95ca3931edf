//! HTTP handlers
//!
//! The webhook accepts JSON or form-encoded bodies with the same field
//! aliases, so gateways can post whichever shape they produce.

use axum::{
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use sb_core::QueuedSms;

use crate::error::{ApiError, Result};
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Inbound SMS payload
#[derive(Debug, Default, Deserialize)]
pub struct InboundPayload {
    /// Originating number
    #[serde(
        default,
        alias = "from_number",
        alias = "phone_number",
        deserialize_with = "lenient_string"
    )]
    pub from: Option<String>,

    /// Message text, routing token first
    #[serde(default, alias = "message", deserialize_with = "lenient_string")]
    pub content: Option<String>,
}

/// Accept strings or bare numbers (phone numbers are sometimes sent as JSON
/// integers).
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Lenient>::deserialize(deserializer)?.map(|v| match v {
        Lenient::Text(s) => s,
        Lenient::Number(n) => n.to_string(),
    }))
}

/// Inbound webhook success body
#[derive(Debug, Serialize)]
pub struct InboundResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Generic API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

async fn extract_payload(state: &AppState, req: Request) -> Result<InboundPayload> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        let Json(payload) = Json::<InboundPayload>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(payload);
    }

    if state.require_json {
        return Err(ApiError::UnsupportedMediaType(
            "Invalid Content-Type. Expected application/json".to_string(),
        ));
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(payload) = Form::<InboundPayload>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(payload);
    }

    Err(ApiError::UnsupportedMediaType(format!(
        "Unsupported Content-Type '{}'",
        content_type
    )))
}

/// Inbound SMS webhook
pub async fn incoming(State(state): State<AppState>, req: Request) -> Result<Json<InboundResponse>> {
    let payload = extract_payload(&state, req).await.inspect_err(|e| {
        warn!("Rejected inbound webhook: {}", e);
    })?;

    let from = payload.from.unwrap_or_default();
    let content = payload.content.unwrap_or_default();
    debug!(from = %from, "Inbound SMS: {}", content);

    let accepted = state.inbound.handle_inbound(&from, &content).await?;

    Ok(Json(InboundResponse {
        success: true,
        message_id: accepted.message_id,
    }))
}

/// Pull-mode poll endpoint
///
/// Always answers 200; with nothing pending, or pull mode off, the list is
/// empty.
pub async fn outgoing(State(state): State<AppState>) -> Json<Vec<QueuedSms>> {
    let Some(queue) = &state.queue else {
        return Json(Vec::new());
    };

    let drained = queue.drain_all().await;
    if !drained.is_empty() {
        debug!("Poller drained {} queued SMS", drained.len());
    }
    Json(drained)
}
