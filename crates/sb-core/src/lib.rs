//! sb-core: SMS <-> chat bridge core
//!
//! Routing, authorization, reply correlation and the hand-off between the
//! webhook side and the chat event loop. Transport crates plug in through
//! [`ChatPlatform`] and [`SmsSender`].

pub mod allowlist;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod queue;
pub mod resolver;

pub use allowlist::AllowList;
pub use chat::{
    chat_channel, readiness, ChatChannel, ChatConsumer, ChatDelivery, ChatHandle, ChatPlatform,
    ChatReceiver, ChatUser, ReadySignal, ReadyWaiter, SentMessage,
};
pub use config::{ApiConfig, BridgeConfig, Config, ContextConfig, DeliveryMode, GatewayConfig};
pub use context::{ContextKey, ContextRecord, ContextStore};
pub use error::{Error, Result};
pub use inbound::{Accepted, InboundBridge};
pub use outbound::{ChatMessage, OutboundBridge, SmsDelivery, SmsSender};
pub use queue::{PullQueue, QueuedSms};
pub use resolver::{Destination, DestinationKind, Resolver, RoutingEntry};
