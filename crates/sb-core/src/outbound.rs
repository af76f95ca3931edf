//! Outbound bridge: chat -> SMS

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::context::{ContextKey, ContextStore};
use crate::error::Result;
use crate::queue::{PullQueue, QueuedSms};
use crate::resolver::Resolver;

/// Pushes one SMS to the gateway, retrying as it sees fit
#[async_trait]
pub trait SmsSender: Send + Sync + 'static {
    async fn deliver(&self, to: &str, body: &str) -> Result<()>;
}

/// Where composed SMS go
#[derive(Clone)]
pub enum SmsDelivery {
    /// Push to the gateway on a separate task
    Push(Arc<dyn SmsSender>),
    /// Leave for the external poller
    Pull(PullQueue),
}

/// A message observed on the chat side
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender_is_self: bool,
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub body: String,
    /// Sent in a direct-message channel
    pub is_direct: bool,
    /// ID of the message this one replies to
    pub reply_to: Option<String>,
}

/// Turns chat messages into SMS
#[derive(Clone)]
pub struct OutboundBridge {
    resolver: Arc<Resolver>,
    context: ContextStore,
    delivery: SmsDelivery,
    fallback_number: Option<String>,
}

impl OutboundBridge {
    pub fn new(resolver: Arc<Resolver>, context: ContextStore, delivery: SmsDelivery) -> Self {
        Self {
            resolver,
            context,
            delivery,
            fallback_number: None,
        }
    }

    /// Number used when neither context nor the routing table yields one.
    pub fn with_fallback_number(mut self, number: Option<String>) -> Self {
        self.fallback_number = number.filter(|n| !n.trim().is_empty());
        self
    }

    /// Handle one chat message. Never fails; problems are logged.
    pub async fn on_chat_message(&self, msg: ChatMessage) {
        if msg.sender_is_self {
            return;
        }

        let body = msg.body.trim();
        if body.is_empty() {
            debug!(channel = %msg.channel_id, "Ignoring chat message without text");
            return;
        }

        let Some(number) = self.resolve_number(&msg).await else {
            info!(
                channel = %msg.channel_id,
                author = %msg.author_name,
                "Dropping chat message: no phone number for this conversation"
            );
            return;
        };

        self.remember_conversation(&msg, &number).await;

        let text = format!("{}: {}", msg.author_name, body);
        match &self.delivery {
            SmsDelivery::Push(sender) => {
                let sender = Arc::clone(sender);
                tokio::spawn(async move {
                    if let Err(e) = sender.deliver(&number, &text).await {
                        error!(to = %number, "SMS delivery failed: {}", e);
                    }
                });
            }
            SmsDelivery::Pull(queue) => {
                debug!(to = %number, "Queued SMS for poller");
                queue.enqueue(QueuedSms::new(number, text)).await;
            }
        }
    }

    async fn resolve_number(&self, msg: &ChatMessage) -> Option<String> {
        if let Some(reply_to) = &msg.reply_to {
            if let Some(number) = self.context.lookup(&ContextKey::message(reply_to)).await {
                return Some(number);
            }
        }

        if let Some(number) = self.context.lookup(&ContextKey::channel(&msg.channel_id)).await {
            return Some(number);
        }

        if let Some(number) = self.resolver.resolve_originator(&msg.channel_id) {
            return Some(number.to_string());
        }

        if msg.is_direct {
            if let Some(number) = self.resolver.resolve_originator(&msg.author_id) {
                return Some(number.to_string());
            }
        }

        self.fallback_number.clone()
    }

    /// Let a bare SMS reply from `number` find its way back here.
    async fn remember_conversation(&self, msg: &ChatMessage, number: &str) {
        let destination = if self.resolver.destination_by_id(&msg.channel_id).is_some() {
            Some(&msg.channel_id)
        } else if msg.is_direct && self.resolver.destination_by_id(&msg.author_id).is_some() {
            Some(&msg.author_id)
        } else {
            None
        };

        self.context
            .record(ContextKey::channel(&msg.channel_id), number)
            .await;
        if let Some(destination) = destination {
            self.context
                .record(ContextKey::number(number), destination.clone())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::resolver::RoutingEntry;

    struct ChannelSender(mpsc::UnboundedSender<(String, String)>);

    #[async_trait]
    impl SmsSender for ChannelSender {
        async fn deliver(&self, to: &str, body: &str) -> Result<()> {
            let _ = self.0.send((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn resolver() -> Arc<Resolver> {
        Arc::new(Resolver::new(
            vec![
                RoutingEntry::channel("nova", "111").with_number("+1000"),
                RoutingEntry::user("abdu", "222").with_number("+2000"),
                RoutingEntry::channel("ops", "333"),
            ],
            std::iter::empty::<&str>(),
        ))
    }

    fn message(channel_id: &str, body: &str) -> ChatMessage {
        ChatMessage {
            sender_is_self: false,
            channel_id: channel_id.to_string(),
            author_id: "42".to_string(),
            author_name: "alice".to_string(),
            body: body.to_string(),
            is_direct: false,
            reply_to: None,
        }
    }

    fn pull_bridge() -> (OutboundBridge, PullQueue, ContextStore) {
        let queue = PullQueue::new();
        let context = ContextStore::default();
        let bridge = OutboundBridge::new(resolver(), context.clone(), SmsDelivery::Pull(queue.clone()));
        (bridge, queue, context)
    }

    #[tokio::test]
    async fn test_reverse_lookup_and_compose() {
        let (bridge, queue, _) = pull_bridge();
        bridge.on_chat_message(message("111", "hello")).await;

        let drained = queue.drain_all().await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].to, "+1000");
        assert_eq!(drained[0].message, "alice: hello");
    }

    #[tokio::test]
    async fn test_own_messages_ignored() {
        let (bridge, queue, _) = pull_bridge();
        let mut msg = message("111", "echo");
        msg.sender_is_self = true;
        bridge.on_chat_message(msg).await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_unresolvable_dropped() {
        let (bridge, queue, _) = pull_bridge();
        bridge.on_chat_message(message("333", "nobody")).await;
        bridge.on_chat_message(message("555", "nobody")).await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_fallback_number() {
        let (bridge, queue, _) = pull_bridge();
        let bridge = bridge.with_fallback_number(Some("+9000".to_string()));
        bridge.on_chat_message(message("333", "anyone")).await;
        assert_eq!(queue.drain_all().await[0].to, "+9000");
    }

    #[tokio::test]
    async fn test_context_beats_routing_table() {
        let (bridge, queue, context) = pull_bridge();
        context.record(ContextKey::channel("111"), "+5555").await;
        bridge.on_chat_message(message("111", "hi")).await;
        assert_eq!(queue.drain_all().await[0].to, "+5555");
    }

    #[tokio::test]
    async fn test_reply_reference_beats_channel_context() {
        let (bridge, queue, context) = pull_bridge();
        context.record(ContextKey::channel("111"), "+5555").await;
        context.record(ContextKey::message("m7"), "+7777").await;

        let mut msg = message("111", "re");
        msg.reply_to = Some("m7".to_string());
        bridge.on_chat_message(msg).await;
        assert_eq!(queue.drain_all().await[0].to, "+7777");
    }

    #[tokio::test]
    async fn test_direct_message_uses_author_binding() {
        let (bridge, queue, context) = pull_bridge();
        let mut msg = message("dm-channel", "psst");
        msg.author_id = "222".to_string();
        msg.is_direct = true;
        bridge.on_chat_message(msg).await;

        assert_eq!(queue.drain_all().await[0].to, "+2000");
        assert_eq!(
            context.lookup(&ContextKey::number("+2000")).await,
            Some("222".to_string())
        );
    }

    #[tokio::test]
    async fn test_records_reply_context_for_sms_side() {
        let (bridge, _, context) = pull_bridge();
        bridge.on_chat_message(message("111", "hello")).await;
        assert_eq!(
            context.lookup(&ContextKey::number("+1000")).await,
            Some("111".to_string())
        );
    }

    #[tokio::test]
    async fn test_push_mode_delivers_off_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = OutboundBridge::new(
            resolver(),
            ContextStore::default(),
            SmsDelivery::Push(Arc::new(ChannelSender(tx))),
        );

        bridge.on_chat_message(message("111", "hello")).await;

        let (to, body) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(to, "+1000");
        assert_eq!(body, "alice: hello");
    }
}
