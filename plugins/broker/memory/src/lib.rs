use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use broker_api::{
    BrokerClient, BrokerError, BrokerMessage, ClientFactory, ClientOptions, Producer,
    ProducerOptions, Receipt,
};

/// URL scheme accepted by [`MemoryBroker`] as a [`ClientFactory`].
pub const MEMORY_URL_SCHEME: &str = "memory://";

// ═══════════════════════════════════════════════════════════════
//  MemoryBrokerConfig
// ═══════════════════════════════════════════════════════════════

/// Artificial latencies, to make producer creation and sends suspend
/// the way a networked client would.
#[derive(Debug, Clone, Default)]
pub struct MemoryBrokerConfig {
    pub producer_latency: Duration,
    pub send_latency: Duration,
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

struct BrokerState {
    config: MemoryBrokerConfig,
    topics: RwLock<HashMap<String, Vec<BrokerMessage>>>,
    producers_created: AtomicUsize,
    /// Every call to `send`, accepted or not.
    send_attempts: AtomicUsize,
    failing_topics: RwLock<HashSet<String>>,
    /// Remaining successful sends; `None` = unlimited.
    send_budget: Mutex<Option<usize>>,
    fail_close: AtomicBool,
}

/// In-process broker. Every topic is an append-only log of the native
/// messages sent to it.
///
/// Clients opened from the same broker share its topics; each client
/// has its own closed state.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

impl MemoryBroker {
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self {
            state: Arc::new(BrokerState {
                config,
                topics: RwLock::new(HashMap::new()),
                producers_created: AtomicUsize::new(0),
                send_attempts: AtomicUsize::new(0),
                failing_topics: RwLock::new(HashSet::new()),
                send_budget: Mutex::new(None),
                fail_close: AtomicBool::new(false),
            }),
        }
    }

    /// New client connected to this broker.
    pub fn client(&self) -> Arc<MemoryClient> {
        Arc::new(MemoryClient {
            state: self.state.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Messages received on `topic`, in arrival order.
    pub async fn messages(&self, topic: &str) -> Vec<BrokerMessage> {
        self.state.topics.read().await.get(topic).cloned().unwrap_or_default()
    }

    /// Total producers opened across all clients.
    pub fn producers_created(&self) -> usize {
        self.state.producers_created.load(Ordering::SeqCst)
    }

    /// Sends issued by producers of this broker, including rejected ones.
    pub fn send_attempts(&self) -> usize {
        self.state.send_attempts.load(Ordering::SeqCst)
    }

    /// Refuse producer creation for `topic`.
    pub async fn fail_producers_for(&self, topic: &str) {
        self.state.failing_topics.write().await.insert(topic.to_string());
    }

    /// Accept `n` more sends, then reject every following one.
    pub async fn reject_sends_after(&self, n: usize) {
        *self.state.send_budget.lock().await = Some(n);
    }

    /// Make every client's `close` report an error.
    pub fn fail_close(&self) {
        self.state.fail_close.store(true, Ordering::SeqCst);
    }
}

impl ClientFactory for MemoryBroker {
    fn connect(
        &self,
        options: &ClientOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn BrokerClient>, BrokerError>> + Send + '_>> {
        let url = options.url.clone();
        Box::pin(async move {
            if !url.starts_with(MEMORY_URL_SCHEME) {
                return Err(BrokerError::connection(format!(
                    "unsupported url '{url}', expected {MEMORY_URL_SCHEME}"
                )));
            }
            tracing::debug!(url = %url, "memory client connected");
            Ok(self.client() as Arc<dyn BrokerClient>)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryClient
// ═══════════════════════════════════════════════════════════════

pub struct MemoryClient {
    state: Arc<BrokerState>,
    closed: Arc<AtomicBool>,
}

impl MemoryClient {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl BrokerClient for MemoryClient {
    fn create_producer(
        &self,
        options: ProducerOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Producer>, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let latency = self.state.config.producer_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if self.is_closed() {
                return Err(BrokerError::closed("client is closed"));
            }
            if self.state.failing_topics.read().await.contains(&options.topic) {
                return Err(BrokerError::producer_creation(format!(
                    "producer for topic '{}' refused",
                    options.topic
                )));
            }

            self.state.producers_created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryProducer {
                topic: options.topic,
                state: self.state.clone(),
                closed: self.closed.clone(),
            }) as Arc<dyn Producer>)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            if self.state.fail_close.load(Ordering::SeqCst) {
                return Err(BrokerError::connection("close handshake failed"));
            }
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryProducer
// ═══════════════════════════════════════════════════════════════

pub struct MemoryProducer {
    topic: String,
    state: Arc<BrokerState>,
    closed: Arc<AtomicBool>,
}

impl Producer for MemoryProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn send(
        &self,
        message: BrokerMessage,
    ) -> Pin<Box<dyn Future<Output = Result<Receipt, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.state.send_attempts.fetch_add(1, Ordering::SeqCst);
            let latency = self.state.config.send_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::closed("producer is closed"));
            }

            if let Some(remaining) = self.state.send_budget.lock().await.as_mut() {
                if *remaining == 0 {
                    return Err(BrokerError::send(format!(
                        "message rejected by topic '{}'",
                        self.topic
                    )));
                }
                *remaining -= 1;
            }

            let mut topics = self.state.topics.write().await;
            let log = topics.entry(self.topic.clone()).or_default();
            log.push(message);
            Ok(Receipt { topic: self.topic.clone(), sequence: (log.len() - 1) as u64 })
        })
    }
}
