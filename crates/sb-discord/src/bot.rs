//! Discord bot bootstrap

use std::sync::Arc;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::info;

use sb_core::{readiness, ChatConsumer, ChatReceiver, ContextStore, OutboundBridge};

use crate::error::{DiscordError, Result};
use crate::handler::Handler;
use crate::platform::DiscordPlatform;

/// Owns the Discord connection and the chat consumer loop
pub struct DiscordBot {
    token: String,
    context: ContextStore,
    outbound: OutboundBridge,
}

impl DiscordBot {
    pub fn new(token: Option<String>, context: ContextStore, outbound: OutboundBridge) -> Result<Self> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or(DiscordError::TokenNotSet)?;

        Ok(Self {
            token,
            context,
            outbound,
        })
    }

    /// Connect and run until the gateway connection ends.
    ///
    /// Deliveries arriving on `rx` are held until the ready event fires.
    pub async fn start(self, rx: ChatReceiver) -> Result<()> {
        // - GUILD_MESSAGES: channel replies to forward as SMS
        // - DIRECT_MESSAGES: DM replies
        // - MESSAGE_CONTENT: message text (privileged intent)
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        info!("Starting Discord bot...");

        let (ready_signal, ready_waiter) = readiness();
        let handler = Handler::new(self.outbound, ready_signal);

        let mut client = Client::builder(&self.token, intents)
            .event_handler(handler)
            .await?;

        let platform = Arc::new(DiscordPlatform::new(Arc::clone(&client.http)));
        let consumer = ChatConsumer::new(platform, self.context, ready_waiter);
        let consumer_task = tokio::spawn(consumer.run(rx));

        let result = client.start().await;
        consumer_task.abort();

        result.map_err(DiscordError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::{PullQueue, Resolver, SmsDelivery};

    fn outbound() -> OutboundBridge {
        OutboundBridge::new(
            Arc::new(Resolver::default()),
            ContextStore::default(),
            SmsDelivery::Pull(PullQueue::new()),
        )
    }

    #[test]
    fn test_missing_token_rejected() {
        assert!(matches!(
            DiscordBot::new(None, ContextStore::default(), outbound()),
            Err(DiscordError::TokenNotSet)
        ));
        assert!(matches!(
            DiscordBot::new(Some("  ".to_string()), ContextStore::default(), outbound()),
            Err(DiscordError::TokenNotSet)
        ));
    }

    #[test]
    fn test_token_accepted() {
        assert!(DiscordBot::new(Some("token".to_string()), ContextStore::default(), outbound()).is_ok());
    }
}
