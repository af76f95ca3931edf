//! Identifier resolution between routing tokens, chat destinations and
//! originating numbers

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// What a destination ID refers to on the chat side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Guild text channel
    #[default]
    Channel,
    /// Direct message to a user
    User,
    /// Bare ID; the chat side tries channel first, then user
    #[serde(alias = "raw", alias = "rawid")]
    RawId,
}

/// One row of the static routing table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingEntry {
    /// Routing token, matched case-insensitively
    #[serde(alias = "prefix")]
    pub token: String,

    #[serde(default, alias = "destination_kind")]
    pub kind: DestinationKind,

    #[serde(alias = "destination_id", deserialize_with = "id_string")]
    pub id: String,

    /// Originating number bound to this destination
    #[serde(default, alias = "originating_number")]
    pub number: Option<String>,
}

impl RoutingEntry {
    pub fn channel(token: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            kind: DestinationKind::Channel,
            id: id.into(),
            number: None,
        }
    }

    pub fn user(token: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::User,
            ..Self::channel(token, id)
        }
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn normalized_token(&self) -> String {
        self.token.trim().to_lowercase()
    }

    pub fn destination(&self) -> Destination {
        Destination {
            kind: self.kind,
            id: self.id.clone(),
        }
    }
}

/// Resolved target of a chat send
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Destination {
    pub kind: DestinationKind,
    pub id: String,
}

impl Destination {
    pub fn channel(id: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Channel,
            id: id.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::User,
            id: id.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DestinationKind::Channel => write!(f, "channel:{}", self.id),
            DestinationKind::User => write!(f, "user:{}", self.id),
            DestinationKind::RawId => write!(f, "id:{}", self.id),
        }
    }
}

/// Accept IDs written either as JSON strings or as bare integers.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s.trim().to_string(),
        Id::Number(n) => n.to_string(),
    })
}

/// Parse a JSON-encoded routing table.
///
/// Accepts an object (`{"nova": "123", "abdu": {"kind": "user", "id": 456}}`)
/// or an array of full entries. Object order is kept as written.
pub fn parse_route_map(json: &str) -> Result<Vec<RoutingEntry>> {
    let value: Value = serde_json::from_str(json)?;

    match value {
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        Value::Object(map) => map
            .into_iter()
            .map(|(token, target)| match target {
                Value::String(id) => Ok(RoutingEntry::channel(token, id.trim())),
                Value::Number(id) => Ok(RoutingEntry::channel(token, id.to_string())),
                Value::Object(mut fields) => {
                    fields.insert("token".to_string(), Value::String(token));
                    Ok(serde_json::from_value(Value::Object(fields))?)
                }
                other => Err(Error::Config(format!(
                    "routing entry '{}' must be an id or an object, got {}",
                    token, other
                ))),
            })
            .collect(),
        other => Err(Error::Config(format!(
            "routing table must be a JSON object or array, got {}",
            other
        ))),
    }
}

fn is_numeric_id(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_phone_number(token: &str) -> bool {
    token
        .strip_prefix('+')
        .is_some_and(is_numeric_id)
}

/// Forward and reverse lookups over the routing table
///
/// Immutable after construction, so it can be shared freely between the
/// request handlers and the chat event loop.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    entries: Vec<RoutingEntry>,
    by_token: HashMap<String, usize>,
    valid_ids: HashSet<String>,
}

impl Resolver {
    /// Build a resolver; `extra_ids` are raw destination IDs accepted as
    /// tokens on top of the IDs the table already routes to.
    pub fn new<I, S>(entries: Vec<RoutingEntry>, extra_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_token = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            // first one wins; Config::validate rejects duplicates up front
            by_token.entry(entry.normalized_token()).or_insert(idx);
        }

        let mut valid_ids: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        valid_ids.extend(
            extra_ids
                .into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty()),
        );

        let mut originators: HashMap<&str, &str> = HashMap::new();
        for entry in &entries {
            let Some(number) = entry.number.as_deref() else {
                continue;
            };
            if let Some(first) = originators.insert(entry.id.as_str(), number) {
                if first != number {
                    warn!(
                        destination = %entry.id,
                        first = %first,
                        ignored = %number,
                        "Multiple originating numbers bound to one destination; reverse lookup uses the first"
                    );
                    originators.insert(entry.id.as_str(), first);
                }
            }
        }

        Self {
            entries,
            by_token,
            valid_ids,
        }
    }

    /// Resolve an inbound routing token to a chat destination.
    ///
    /// Order: configured alias, then validated raw ID, then a phone number
    /// bound to a configured entry. Unvalidated numeric IDs never resolve.
    pub fn resolve_destination(&self, token: &str) -> Option<Destination> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        if let Some(&idx) = self.by_token.get(&token.to_lowercase()) {
            return Some(self.entries[idx].destination());
        }

        if is_numeric_id(token) && self.valid_ids.contains(token) {
            return Some(self.destination_by_id(token).unwrap_or(Destination {
                kind: DestinationKind::RawId,
                id: token.to_string(),
            }));
        }

        if is_phone_number(token) || is_numeric_id(token) {
            return self
                .entries
                .iter()
                .find(|e| e.number.as_deref().map(str::trim) == Some(token))
                .map(RoutingEntry::destination);
        }

        None
    }

    /// Descriptor for a destination ID already known to the bridge.
    pub fn destination_by_id(&self, id: &str) -> Option<Destination> {
        let id = id.trim();
        if let Some(entry) = self.entries.iter().find(|e| e.id == id) {
            return Some(entry.destination());
        }

        self.valid_ids.contains(id).then(|| Destination {
            kind: DestinationKind::RawId,
            id: id.to_string(),
        })
    }

    /// First originating number bound to a destination, in configuration order.
    pub fn resolve_originator(&self, destination_id: &str) -> Option<&str> {
        let destination_id = destination_id.trim();
        self.entries
            .iter()
            .filter(|e| e.id == destination_id)
            .find_map(|e| e.number.as_deref())
    }
}
