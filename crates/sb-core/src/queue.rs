//! In-memory FIFO of outbound SMS for pull-mode delivery

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// An SMS waiting for the external poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSms {
    pub to: String,
    pub message: String,
    pub id: Uuid,
}

impl QueuedSms {
    pub fn new(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message: message.into(),
            id: Uuid::new_v4(),
        }
    }
}

/// Pull-queue; cloning shares the same underlying queue
#[derive(Debug, Clone, Default)]
pub struct PullQueue {
    items: Arc<Mutex<Vec<QueuedSms>>>,
}

impl PullQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, msg: QueuedSms) {
        self.items.lock().await.push(msg);
    }

    /// Take every queued message in FIFO order, leaving the queue empty.
    ///
    /// Read and clear happen under one lock, so a concurrent enqueue lands
    /// either in this drain or in the next one.
    pub async fn drain_all(&self) -> Vec<QueuedSms> {
        std::mem::take(&mut *self.items.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
