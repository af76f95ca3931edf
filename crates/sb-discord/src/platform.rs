//! [`ChatPlatform`] over the Discord HTTP API

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::{Http, HttpError};
use serenity::model::id::{ChannelId, UserId};
use tracing::{debug, warn};

use sb_core::{ChatChannel, ChatPlatform, ChatUser, SentMessage};

use crate::error::DiscordError;

/// Discord caps message content at 2000 characters
const MAX_MESSAGE_LEN: usize = 2000;
const CHUNK_LEN: usize = 1900;

/// Split a message into chunks, preferring sentence and line boundaries
fn split_message(text: &str, max_size: usize) -> Vec<String> {
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_size {
            chunks.push(remaining.to_string());
            break;
        }

        let mut search_end = max_size;
        while !remaining.is_char_boundary(search_end) {
            search_end -= 1;
        }
        let chunk = &remaining[..search_end];

        let break_point = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". "))
            .or_else(|| chunk.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(search_end);

        chunks.push(remaining[..break_point].to_string());
        remaining = &remaining[break_point..];
    }

    chunks
}

/// Snowflakes are non-zero u64s; anything else cannot exist on Discord
fn parse_id(id: &str) -> Option<u64> {
    id.trim().parse::<u64>().ok().filter(|v| *v != 0)
}

fn parse_id_or_err(id: &str) -> Result<u64, DiscordError> {
    parse_id(id).ok_or_else(|| DiscordError::InvalidId(id.to_string()))
}

fn is_missing(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp))
            if matches!(resp.status_code.as_u16(), 403 | 404)
    )
}

/// Discord HTTP client shared with the gateway connection
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn say(&self, channel_id: ChannelId, body: &str) -> Result<SentMessage, DiscordError> {
        let chunks = if body.len() <= MAX_MESSAGE_LEN {
            vec![body.to_string()]
        } else {
            split_message(body, CHUNK_LEN)
        };

        let mut first = None;
        for chunk in chunks {
            let msg = channel_id.say(&self.http, chunk).await?;
            first.get_or_insert(SentMessage {
                id: msg.id.to_string(),
                channel_id: msg.channel_id.to_string(),
            });
        }

        first.ok_or_else(|| DiscordError::InvalidId(channel_id.to_string()))
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn get_channel(&self, id: &str) -> sb_core::Result<Option<ChatChannel>> {
        let Some(raw) = parse_id(id) else {
            return Ok(None);
        };

        match self.http.get_channel(ChannelId::new(raw)).await {
            Ok(channel) => Ok(Some(ChatChannel {
                id: channel.id().to_string(),
                name: channel.guild().map(|c| c.name),
            })),
            Err(e) if is_missing(&e) => {
                debug!("No Discord channel {}", id);
                Ok(None)
            }
            Err(e) => Err(DiscordError::from(e).into()),
        }
    }

    async fn get_user(&self, id: &str) -> sb_core::Result<Option<ChatUser>> {
        let Some(raw) = parse_id(id) else {
            return Ok(None);
        };

        match self.http.get_user(UserId::new(raw)).await {
            Ok(user) => Ok(Some(ChatUser {
                id: user.id.to_string(),
                name: user.name,
            })),
            Err(e) if is_missing(&e) => {
                debug!("No Discord user {}", id);
                Ok(None)
            }
            Err(e) => Err(DiscordError::from(e).into()),
        }
    }

    async fn send_to_channel(&self, channel_id: &str, body: &str) -> sb_core::Result<SentMessage> {
        let channel_id = ChannelId::new(parse_id_or_err(channel_id)?);
        Ok(self.say(channel_id, body).await?)
    }

    async fn send_to_dm(&self, user_id: &str, body: &str) -> sb_core::Result<SentMessage> {
        let user_id = UserId::new(parse_id_or_err(user_id)?);
        let dm = user_id.create_dm_channel(&self.http).await.map_err(|e| {
            warn!("Failed to open DM with {}: {}", user_id, e);
            DiscordError::from(e)
        })?;
        Ok(self.say(dm.id, body).await?)
    }
}
