//! Inbound bridge: SMS webhook -> chat

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::allowlist::AllowList;
use crate::chat::ChatHandle;
use crate::context::{ContextKey, ContextStore};
use crate::error::{Error, Result};
use crate::resolver::{Destination, Resolver};

/// Outcome of an accepted inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub destination: Destination,
    /// Set only when delivery confirmation is enabled
    pub message_id: Option<String>,
}

/// Split `content` into a routing token and a body.
///
/// Splits at the first `delimiter`, or at the first whitespace when no
/// delimiter is configured. `None` when there is no separator or the body
/// would be empty.
pub fn split_route(content: &str, delimiter: Option<char>) -> Option<(&str, &str)> {
    let content = content.trim();
    let (token, body) = match delimiter {
        Some(d) => content.split_once(d)?,
        None => content.split_once(char::is_whitespace)?,
    };

    let (token, body) = (token.trim(), body.trim());
    if token.is_empty() || body.is_empty() {
        return None;
    }
    Some((token, body))
}

/// Authorizes, parses and resolves inbound SMS, then hands them to the chat
/// loop without waiting on chat I/O.
#[derive(Clone)]
pub struct InboundBridge {
    allow_list: Arc<AllowList>,
    resolver: Arc<Resolver>,
    context: ContextStore,
    chat: ChatHandle,
    delimiter: Option<char>,
    confirm_timeout: Option<Duration>,
}

impl InboundBridge {
    pub fn new(
        allow_list: Arc<AllowList>,
        resolver: Arc<Resolver>,
        context: ContextStore,
        chat: ChatHandle,
    ) -> Self {
        Self {
            allow_list,
            resolver,
            context,
            chat,
            delimiter: None,
            confirm_timeout: None,
        }
    }

    /// Split token and body at this character instead of whitespace.
    pub fn with_delimiter(mut self, delimiter: Option<char>) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Wait, at most `timeout`, for the chat message id before returning.
    pub fn with_confirmation(mut self, timeout: Option<Duration>) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Handle one inbound SMS.
    pub async fn handle_inbound(&self, from: &str, content: &str) -> Result<Accepted> {
        let from = from.trim();
        let content = content.trim();

        if from.is_empty() {
            return Err(Error::MalformedInput("missing originating number".to_string()));
        }
        if content.is_empty() {
            return Err(Error::MalformedInput("missing message content".to_string()));
        }

        if !self.allow_list.authorize(from) {
            warn!(from = %from, "Rejected SMS from unauthorized number");
            return Err(Error::Unauthorized);
        }

        let (destination, body) = match split_route(content, self.delimiter) {
            Some((token, body)) => {
                let destination = self.resolver.resolve_destination(token).ok_or_else(|| {
                    Error::UnresolvedRoute(format!("prefix '{}' not found", token.to_lowercase()))
                })?;
                (destination, body)
            }
            None => (self.destination_from_context(from).await?, content),
        };

        debug!(from = %from, destination = %destination, "Handing SMS to chat loop: {}", body);

        let message_id = match self.confirm_timeout {
            Some(timeout) => {
                let sent = self
                    .chat
                    .submit_and_confirm(destination.clone(), body, from, timeout)
                    .await?;
                Some(sent.id)
            }
            None => {
                self.chat.submit(destination.clone(), body, from)?;
                None
            }
        };

        // Only a handed-off message opens a conversation
        self.context
            .record(ContextKey::number(from), destination.id.clone())
            .await;
        self.context
            .record(ContextKey::channel(&destination.id), from)
            .await;

        info!(from = %from, destination = %destination, "Accepted inbound SMS");
        Ok(Accepted {
            destination,
            message_id,
        })
    }

    async fn destination_from_context(&self, from: &str) -> Result<Destination> {
        let Some(id) = self.context.lookup(&ContextKey::number(from)).await else {
            return Err(Error::MalformedInput(
                "missing message body and no active conversation".to_string(),
            ));
        };

        debug!(from = %from, destination = %id, "Routing by conversation context");
        self.resolver
            .destination_by_id(&id)
            .ok_or_else(|| Error::UnresolvedRoute(format!("destination '{}' no longer routable", id)))
    }
}
