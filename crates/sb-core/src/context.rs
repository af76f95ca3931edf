//! Short-lived reply-correlation memory
//!
//! Shared between the webhook handlers and the chat event loop, so every
//! access goes through the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::ContextConfig;

/// What a context record is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// Originating phone number -> chat destination ID
    Number(String),
    /// Chat channel (or DM user) ID -> originating phone number
    Channel(String),
    /// Delivered chat message ID -> originating phone number
    Message(String),
}

impl ContextKey {
    pub fn number(n: impl AsRef<str>) -> Self {
        Self::Number(n.as_ref().trim().to_string())
    }

    pub fn channel(id: impl AsRef<str>) -> Self {
        Self::Channel(id.as_ref().trim().to_string())
    }

    pub fn message(id: impl AsRef<str>) -> Self {
        Self::Message(id.as_ref().trim().to_string())
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number:{}", n),
            Self::Channel(id) => write!(f, "channel:{}", id),
            Self::Message(id) => write!(f, "message:{}", id),
        }
    }
}

/// One correlation; replaced wholesale, never patched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRecord {
    pub key: ContextKey,
    pub counterpart: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory context store with TTL and a size cap
#[derive(Debug, Clone)]
pub struct ContextStore {
    records: Arc<RwLock<HashMap<ContextKey, ContextRecord>>>,
    ttl: chrono::Duration,
    max_entries: usize,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(&ContextConfig::default())
    }
}

impl ContextStore {
    pub fn new(config: &ContextConfig) -> Self {
        Self::with_limits(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            max_entries: max_entries.max(1),
        }
    }

    fn is_expired(&self, record: &ContextRecord, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.created_at) > self.ttl
    }

    /// Insert or replace the record for `key`.
    pub async fn record(&self, key: ContextKey, counterpart: impl Into<String>) {
        self.record_at(key, counterpart.into(), Utc::now()).await;
    }

    async fn record_at(&self, key: ContextKey, counterpart: String, created_at: DateTime<Utc>) {
        let mut records = self.records.write().await;

        debug!(key = %key, counterpart = %counterpart, "Recording context");
        records.insert(
            key.clone(),
            ContextRecord {
                key,
                counterpart,
                created_at,
            },
        );

        while records.len() > self.max_entries {
            let Some(oldest) = records
                .values()
                .min_by_key(|r| r.created_at)
                .map(|r| r.key.clone())
            else {
                break;
            };
            debug!(key = %oldest, "Evicting oldest context record");
            records.remove(&oldest);
        }
    }

    /// Counterpart for `key`, unless the record is missing or expired.
    pub async fn lookup(&self, key: &ContextKey) -> Option<String> {
        let records = self.records.read().await;
        let now = Utc::now();
        records
            .get(key)
            .filter(|r| !self.is_expired(r, now))
            .map(|r| r.counterpart.clone())
    }

    /// Drop expired records, returning how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let mut records = self.records.write().await;
        let now = Utc::now();
        let before = records.len();
        records.retain(|_, r| !self.is_expired(r, now));
        before - records.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Periodically prune expired records until the task is aborted.
    pub fn start_cleanup_task(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let pruned = store.prune_expired().await;
                if pruned > 0 {
                    debug!("Pruned {} expired context records", pruned);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_lookup() {
        let store = ContextStore::default();
        store.record(ContextKey::number("+15550001111"), "111").await;

        assert_eq!(
            store.lookup(&ContextKey::number(" +15550001111 ")).await,
            Some("111".to_string())
        );
        assert_eq!(store.lookup(&ContextKey::channel("+15550001111")).await, None);
    }

    #[tokio::test]
    async fn test_record_replaces() {
        let store = ContextStore::default();
        store.record(ContextKey::channel("111"), "+1000").await;
        store.record(ContextKey::channel("111"), "+2000").await;

        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.lookup(&ContextKey::channel("111")).await,
            Some("+2000".to_string())
        );
    }

    #[tokio::test]
    async fn test_expired_records_are_ignored_and_pruned() {
        let store = ContextStore::with_limits(Duration::from_secs(60), 16);
        let stale = Utc::now() - chrono::Duration::seconds(120);
        store
            .record_at(ContextKey::channel("old"), "+1000".to_string(), stale)
            .await;
        store.record(ContextKey::channel("new"), "+2000").await;

        assert_eq!(store.lookup(&ContextKey::channel("old")).await, None);
        assert_eq!(store.prune_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_size_cap_evicts_oldest() {
        let store = ContextStore::with_limits(Duration::from_secs(3600), 2);
        let now = Utc::now();
        store
            .record_at(ContextKey::channel("a"), "1".to_string(), now - chrono::Duration::seconds(30))
            .await;
        store
            .record_at(ContextKey::channel("b"), "2".to_string(), now - chrono::Duration::seconds(20))
            .await;
        store.record(ContextKey::channel("c"), "3").await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.lookup(&ContextKey::channel("a")).await, None);
        assert!(store.lookup(&ContextKey::channel("b")).await.is_some());
        assert!(store.lookup(&ContextKey::channel("c")).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = ContextStore::default();
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record(ContextKey::channel(i.to_string()), "+1000").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 50);
    }
}
