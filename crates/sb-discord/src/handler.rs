//! Discord event handler

use async_trait::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, info};

use sb_core::{ChatMessage, OutboundBridge, ReadySignal};

/// Fires readiness and feeds chat messages to the outbound bridge
pub struct Handler {
    outbound: OutboundBridge,
    ready: ReadySignal,
}

impl Handler {
    pub fn new(outbound: OutboundBridge, ready: ReadySignal) -> Self {
        Self { outbound, ready }
    }
}

fn to_chat_message(msg: &Message, bot_id: UserId) -> ChatMessage {
    ChatMessage {
        sender_is_self: msg.author.id == bot_id,
        channel_id: msg.channel_id.to_string(),
        author_id: msg.author.id.to_string(),
        author_name: msg
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| msg.author.name.clone()),
        body: msg.content.clone(),
        is_direct: msg.guild_id.is_none(),
        reply_to: msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| id.to_string()),
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Connected to Discord as {}", ready.user.name);
        self.ready.mark_ready();
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let bot_id = ctx.cache.current_user().id;

        // Other bots never reach SMS
        if msg.author.bot && msg.author.id != bot_id {
            debug!("Ignoring message from bot {}", msg.author.id);
            return;
        }

        self.outbound.on_chat_message(to_chat_message(&msg, bot_id)).await;
    }
}
