use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ════════════════════════════════════════════════════════════════
//  Metadata
// ════════════════════════════════════════════════════════════════

/// Unordered string → string map attached to a [`Message`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Value for `key`, or `""` when the key is absent.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Key presence, independent of the value (an empty value still counts).
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(HashMap::with_capacity(capacity))
    }
}

impl From<HashMap<String, String>> for Metadata {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ════════════════════════════════════════════════════════════════
//  Message context
// ════════════════════════════════════════════════════════════════

/// Cancellation and deadline carried by a single message.
///
/// An empty context means the send may wait indefinitely.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_unbounded(&self) -> bool {
        self.cancel.is_none() && self.deadline.is_none()
    }
}

// ════════════════════════════════════════════════════════════════
//  Message
// ════════════════════════════════════════════════════════════════

/// Broker-agnostic message envelope: uuid, opaque payload, metadata.
///
/// Two messages are equal when uuid, payload and metadata match;
/// the context is not compared.
#[derive(Debug, Clone)]
pub struct Message {
    uuid: String,
    payload: Bytes,
    pub metadata: Metadata,
    context: MessageContext,
}

impl Message {
    pub fn new(uuid: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            uuid: uuid.into(),
            payload: payload.into(),
            metadata: Metadata::new(),
            context: MessageContext::default(),
        }
    }

    /// Message with a freshly generated v4 uuid.
    pub fn with_new_uuid(payload: impl Into<Bytes>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), payload)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_context(mut self, context: MessageContext) -> Self {
        self.context = context;
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn context(&self) -> &MessageContext {
        &self.context
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid && self.payload == other.payload && self.metadata == other.metadata
    }
}

impl Eq for Message {}

// ════════════════════════════════════════════════════════════════
//  Native broker message
// ════════════════════════════════════════════════════════════════

/// Message as the broker client sees it: payload plus flat properties.
///
/// Used both for sending through a producer and for what a consumer
/// would hand back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerMessage {
    pub payload: Bytes,
    pub properties: HashMap<String, String>,
}

impl BrokerMessage {
    pub fn new(payload: impl Into<Bytes>, properties: HashMap<String, String>) -> Self {
        Self { payload: payload.into(), properties }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Broker acknowledgement of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub topic: String,
    /// Position of the message within its topic, starting at 0.
    pub sequence: u64,
}
