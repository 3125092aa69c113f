use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use broker_api::{
    BrokerClient, BrokerError, BrokerMessage, ClientFactory, Message, Producer, ProducerOptions, Receipt,
};

use crate::{DefaultMarshaler, Marshaler, PublisherConfig, PublisherError};

// ═══════════════════════════════════════════════════════════════
//  Publisher
// ═══════════════════════════════════════════════════════════════

/// Publishes generic messages to named topics through a broker client.
///
/// Producers are opened lazily, one per topic, and reused until the
/// publisher is closed. The registry never shrinks.
pub struct Publisher {
    client: Arc<dyn BrokerClient>,
    marshaler: Arc<dyn Marshaler>,
    producers: Mutex<HashMap<String, Arc<dyn Producer>>>,
    closed: AtomicBool,
}

impl Publisher {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self::with_marshaler(client, Arc::new(DefaultMarshaler))
    }

    pub fn with_marshaler(client: Arc<dyn BrokerClient>, marshaler: Arc<dyn Marshaler>) -> Self {
        Self {
            client,
            marshaler,
            producers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Open a broker client through `factory` and wrap it.
    pub async fn connect(
        config: &PublisherConfig,
        factory: &dyn ClientFactory,
    ) -> Result<Self, PublisherError> {
        let client = factory
            .connect(&config.client)
            .await
            .map_err(PublisherError::Connect)?;
        tracing::debug!(url = %config.client.url, marshaler = ?config.marshaler, "publisher connected");
        Ok(Self::with_marshaler(client, config.marshaler.build()))
    }

    /// Producer for `topic`, created on first use.
    ///
    /// The registry lock is held across the whole lookup-then-create
    /// sequence, so concurrent callers never open two producers for the
    /// same topic. A failed creation is not cached.
    pub async fn get_producer(&self, topic: &str) -> Result<Arc<dyn Producer>, PublisherError> {
        let mut producers = self.producers.lock().await;
        if self.is_closed() {
            return Err(PublisherError::Closed);
        }

        if let Some(producer) = producers.get(topic) {
            return Ok(producer.clone());
        }

        tracing::debug!(topic_name = %topic, "creating producer");
        let producer = self
            .client
            .create_producer(ProducerOptions::new(topic))
            .await
            .map_err(|e| PublisherError::ProducerCreation { topic: topic.to_string(), source: e })?;
        producers.insert(topic.to_string(), producer.clone());

        Ok(producer)
    }

    /// Publish `messages` to `topic`, in order.
    ///
    /// Stops at the first failure: messages after the failing one are not
    /// sent, and messages before it are not rolled back.
    pub async fn publish(&self, topic: &str, messages: &[Message]) -> Result<(), PublisherError> {
        if self.is_closed() {
            return Err(PublisherError::Closed);
        }

        for message in messages {
            tracing::trace!(message_uuid = %message.uuid(), topic_name = %topic, "publishing message");

            let native = self.marshaler.marshal(topic, message)?;
            let producer = self.get_producer(topic).await?;
            let receipt = send_in_context(producer.as_ref(), native, message).await?;

            tracing::trace!(
                message_uuid = %message.uuid(),
                topic_name = %topic,
                sequence = receipt.sequence,
                "message sent"
            );
        }

        Ok(())
    }

    /// Close the broker client, releasing every producer with it.
    ///
    /// Does not wait for in-flight sends. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), PublisherError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::trace!("closing publisher");
        let result = self.client.close().await;
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "broker client close failed");
        }
        tracing::trace!("publisher closed");

        result.map_err(PublisherError::Close)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of producers opened so far.
    pub async fn producer_count(&self) -> usize {
        self.producers.lock().await.len()
    }
}

/// Send under the message's own cancellation token and deadline.
/// Without either, waits for the broker as long as it takes.
async fn send_in_context(
    producer: &dyn Producer,
    native: BrokerMessage,
    message: &Message,
) -> Result<Receipt, PublisherError> {
    let ctx = message.context();
    let send_err = |e: BrokerError| PublisherError::Send {
        topic: producer.topic().to_string(),
        message_uuid: message.uuid().to_string(),
        source: e,
    };

    if ctx.is_unbounded() {
        return producer.send(native).await.map_err(send_err);
    }

    let cancelled = || PublisherError::Cancelled { message_uuid: message.uuid().to_string() };
    let expired = || PublisherError::DeadlineExceeded { message_uuid: message.uuid().to_string() };

    if ctx.cancel_token().is_some_and(|t| t.is_cancelled()) {
        return Err(cancelled());
    }
    if ctx.deadline().is_some_and(|d| Instant::now() >= d) {
        return Err(expired());
    }

    let on_cancel = async {
        match ctx.cancel_token() {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let on_deadline = async {
        match ctx.deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = on_cancel => Err(cancelled()),
        _ = on_deadline => Err(expired()),
        result = producer.send(native) => result.map_err(send_err),
    }
}
