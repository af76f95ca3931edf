//! Hand-off from the request-serving side into the single chat event loop
//!
//! Webhook handlers never touch the chat connection. They push a
//! [`ChatDelivery`] through a [`ChatHandle`]; one [`ChatConsumer`] task owns
//! the platform and works through deliveries strictly in submission order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::context::{ContextKey, ContextStore};
use crate::error::{Error, Result};
use crate::resolver::{Destination, DestinationKind};

/// A channel as seen by the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChannel {
    pub id: String,
    pub name: Option<String>,
}

/// A user as seen by the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
}

/// A message the platform accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub channel_id: String,
}

/// Operations the bridge needs from the chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// `Ok(None)` when the platform has no such channel
    async fn get_channel(&self, id: &str) -> Result<Option<ChatChannel>>;

    /// `Ok(None)` when the platform has no such user
    async fn get_user(&self, id: &str) -> Result<Option<ChatUser>>;

    async fn send_to_channel(&self, channel_id: &str, body: &str) -> Result<SentMessage>;

    async fn send_to_dm(&self, user_id: &str, body: &str) -> Result<SentMessage>;
}

/// One unit of work for the chat loop
#[derive(Debug)]
pub struct ChatDelivery {
    pub destination: Destination,
    pub body: String,
    /// Number the message came from, recorded for reply routing
    pub originator: String,
    confirm: Option<oneshot::Sender<Result<SentMessage>>>,
}

/// Thread-safe submission side of the hand-off
#[derive(Debug, Clone)]
pub struct ChatHandle {
    tx: mpsc::UnboundedSender<ChatDelivery>,
}

/// Receiving side, owned by the chat consumer
pub type ChatReceiver = mpsc::UnboundedReceiver<ChatDelivery>;

/// Create a connected hand-off pair.
pub fn chat_channel() -> (ChatHandle, ChatReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChatHandle { tx }, rx)
}

impl ChatHandle {
    /// Queue a delivery and return immediately.
    pub fn submit(
        &self,
        destination: Destination,
        body: impl Into<String>,
        originator: impl Into<String>,
    ) -> Result<()> {
        self.tx
            .send(ChatDelivery {
                destination,
                body: body.into(),
                originator: originator.into(),
                confirm: None,
            })
            .map_err(|_| Error::HandoffClosed)
    }

    /// Queue a delivery and wait, at most `timeout`, for the sent message.
    ///
    /// The delivery is not withdrawn on timeout; the loop still sends it.
    pub async fn submit_and_confirm(
        &self,
        destination: Destination,
        body: impl Into<String>,
        originator: impl Into<String>,
        timeout: Duration,
    ) -> Result<SentMessage> {
        let (confirm_tx, confirm_rx) = oneshot::channel();
        self.tx
            .send(ChatDelivery {
                destination,
                body: body.into(),
                originator: originator.into(),
                confirm: Some(confirm_tx),
            })
            .map_err(|_| Error::HandoffClosed)?;

        match tokio::time::timeout(timeout, confirm_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::HandoffClosed),
            Err(_) => Err(Error::ConfirmationTimeout),
        }
    }
}

/// Fired once the chat connection has authenticated
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

/// Awaits [`ReadySignal::mark_ready`]
#[derive(Debug, Clone)]
pub struct ReadyWaiter {
    rx: watch::Receiver<bool>,
}

pub fn readiness() -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = watch::channel(false);
    (ReadySignal { tx: Arc::new(tx) }, ReadyWaiter { rx })
}

impl ReadySignal {
    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }
}

impl ReadyWaiter {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until ready. Errors only if the signal side is gone first.
    pub async fn wait(&mut self) -> Result<()> {
        self.rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::Chat("chat connection closed before ready".to_string()))
    }
}

/// The single chat event-loop consumer
pub struct ChatConsumer<P: ChatPlatform> {
    platform: Arc<P>,
    context: ContextStore,
    ready: ReadyWaiter,
}

impl<P: ChatPlatform> ChatConsumer<P> {
    pub fn new(platform: Arc<P>, context: ContextStore, ready: ReadyWaiter) -> Self {
        Self {
            platform,
            context,
            ready,
        }
    }

    /// Process deliveries until every [`ChatHandle`] is dropped.
    pub async fn run(mut self, mut rx: ChatReceiver) {
        if !self.ready.is_ready() {
            debug!("Chat consumer waiting for ready signal");
        }
        if let Err(e) = self.ready.wait().await {
            error!("Chat consumer stopping: {}", e);
            return;
        }
        info!("Chat consumer started");

        while let Some(delivery) = rx.recv().await {
            let ChatDelivery {
                destination,
                body,
                originator,
                confirm,
            } = delivery;

            let result = self.deliver(&destination, &body).await;
            match &result {
                Ok(sent) => {
                    info!(
                        destination = %destination,
                        message_id = %sent.id,
                        "Forwarded SMS from {} to chat",
                        originator
                    );
                    self.context
                        .record(ContextKey::message(&sent.id), originator.clone())
                        .await;
                    self.context
                        .record(ContextKey::channel(&sent.channel_id), originator)
                        .await;
                }
                Err(e) => {
                    error!(destination = %destination, "Chat delivery failed: {}", e);
                }
            }

            if let Some(confirm) = confirm {
                if confirm.send(result).is_err() {
                    debug!("Confirmation receiver dropped before delivery finished");
                }
            }
        }

        info!("Chat consumer stopped: all handles dropped");
    }

    async fn deliver(&self, destination: &Destination, body: &str) -> Result<SentMessage> {
        match destination.kind {
            DestinationKind::Channel => self.platform.send_to_channel(&destination.id, body).await,
            DestinationKind::User => self.platform.send_to_dm(&destination.id, body).await,
            DestinationKind::RawId => {
                if self.platform.get_channel(&destination.id).await?.is_some() {
                    return self.platform.send_to_channel(&destination.id, body).await;
                }
                if self.platform.get_user(&destination.id).await?.is_some() {
                    return self.platform.send_to_dm(&destination.id, body).await;
                }
                warn!("Raw destination {} is neither a channel nor a user", destination.id);
                Err(Error::Chat(format!("unknown destination {}", destination.id)))
            }
        }
    }
}
