//! sb-discord: Discord side of the SMS bridge
//!
//! Serenity 0.12 connection, the [`sb_core::ChatPlatform`] implementation
//! used by the chat consumer, and the event handler feeding chat messages
//! into the outbound bridge.

pub mod bot;
pub mod error;
pub mod handler;
pub mod platform;

pub use bot::DiscordBot;
pub use error::{DiscordError, Result};
pub use platform::DiscordPlatform;
