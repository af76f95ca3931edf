//! Error types for sb-discord

use thiserror::Error;

/// sb-discord error type
#[derive(Error, Debug)]
pub enum DiscordError {
    #[error("Discord token not set")]
    TokenNotSet,

    #[error("Invalid Discord id: {0}")]
    InvalidId(String),

    #[error("Serenity error: {0}")]
    SerenityError(#[from] serenity::Error),
}

impl From<DiscordError> for sb_core::Error {
    fn from(err: DiscordError) -> Self {
        sb_core::Error::Chat(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DiscordError>;
