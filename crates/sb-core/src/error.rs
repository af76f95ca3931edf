//! Error types for sb-core

use thiserror::Error;

/// Main error type for sb-core
///
/// The first group of variants is terminal and reported to the inbound
/// caller. Delivery and chat variants never reach an HTTP caller; they are
/// logged where they surface.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unauthorized number")]
    Unauthorized,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("route not found: {0}")]
    UnresolvedRoute(String),

    #[error("transient delivery failure: {0}")]
    TransientDelivery(String),

    #[error("delivery failed after {attempts} attempts")]
    DeliveryExhausted { attempts: u32 },

    #[error("chat platform error: {0}")]
    Chat(String),

    #[error("chat hand-off channel closed")]
    HandoffClosed,

    #[error("timed out waiting for chat delivery confirmation")]
    ConfirmationTimeout,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error should be reported to the inbound caller as-is.
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::MalformedInput(_) | Self::UnresolvedRoute(_)
        )
    }
}

/// Result type alias for sb-core
pub type Result<T> = std::result::Result<T, Error>;
