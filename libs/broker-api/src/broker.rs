use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::{BrokerError, BrokerMessage, Receipt};

// ════════════════════════════════════════════════════════════════
//  Options
// ════════════════════════════════════════════════════════════════

fn default_url() -> String {
    "pulsar://localhost:6650".into()
}
fn default_operation_timeout_ms() -> u64 {
    30_000
}
fn default_connection_timeout_ms() -> u64 {
    5_000
}

/// Connection settings handed verbatim to a [`ClientFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientOptions {
    /// Broker service URL (e.g. "pulsar://localhost:6650", "memory://").
    #[serde(default = "default_url")]
    pub url: String,
    /// Timeout for broker-side operations such as producer creation.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Timeout for establishing the connection.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: default_url(),
            operation_timeout_ms: default_operation_timeout_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

/// Options for a single producer. One producer is bound to one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerOptions {
    pub topic: String,
}

impl ProducerOptions {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into() }
    }
}

// ════════════════════════════════════════════════════════════════
//  Broker capability traits
// ════════════════════════════════════════════════════════════════

/// Send handle bound to exactly one topic.
///
/// Implementations must tolerate concurrent `send` calls; the publisher
/// shares one handle between all callers publishing to the same topic.
pub trait Producer: Send + Sync {
    /// Topic this producer is bound to.
    fn topic(&self) -> &str;

    /// Send a native message and wait for the broker acknowledgement.
    fn send(&self, message: BrokerMessage)
        -> Pin<Box<dyn Future<Output = Result<Receipt, BrokerError>> + Send + '_>>;
}

/// Connected broker client.
pub trait BrokerClient: Send + Sync {
    /// Open a new producer for `options.topic`.
    fn create_producer(&self, options: ProducerOptions)
        -> Pin<Box<dyn Future<Output = Result<Arc<dyn Producer>, BrokerError>> + Send + '_>>;

    /// Close the client. All producers created by it are released too.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

/// Opens broker clients from [`ClientOptions`].
pub trait ClientFactory: Send + Sync {
    fn connect(&self, options: &ClientOptions)
        -> Pin<Box<dyn Future<Output = Result<Arc<dyn BrokerClient>, BrokerError>> + Send + '_>>;
}
