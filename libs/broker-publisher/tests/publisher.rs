use std::sync::Arc;
use std::time::Duration;

use broker_api::{BrokerErrorKind, ClientOptions, Message, MessageContext, Metadata};
use broker_memory::{MemoryBroker, MemoryBrokerConfig};
use broker_publisher::{
    DefaultMarshaler, JsonEnvelopeMarshaler, MarshalError, MarshalerKind, Publisher,
    PublisherConfig, PublisherError, Unmarshaler, UUID_HEADER_KEY,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn message(uuid: &str) -> Message {
    let metadata: Metadata = [("k", "v")].into_iter().collect();
    Message::new(uuid, format!("payload of {uuid}")).with_metadata(metadata)
}

#[tokio::test]
async fn publishes_batch_with_uuid_property() {
    init_tracing();
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());

    publisher.publish("orders", &[message("id-1"), message("id-2")]).await.unwrap();

    let log = broker.messages("orders").await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].property(UUID_HEADER_KEY), Some("id-1"));
    assert_eq!(log[1].property(UUID_HEADER_KEY), Some("id-2"));
    for native in &log {
        assert_eq!(native.property("k"), Some("v"));
    }

    let decoded = DefaultMarshaler.unmarshal(&log[1]).unwrap();
    assert_eq!(decoded, message("id-2"));
}

#[tokio::test]
async fn one_producer_per_topic() {
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());

    publisher.publish("a", &[message("1")]).await.unwrap();
    assert_eq!(broker.producers_created(), 1);

    publisher.publish("a", &[message("2"), message("3")]).await.unwrap();
    assert_eq!(broker.producers_created(), 1);

    publisher.publish("b", &[message("4")]).await.unwrap();
    assert_eq!(broker.producers_created(), 2);
    assert_eq!(publisher.producer_count().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_producer_creates_once() {
    let broker = MemoryBroker::new(MemoryBrokerConfig {
        producer_latency: Duration::from_millis(50),
        ..MemoryBrokerConfig::default()
    });
    let publisher = Arc::new(Publisher::new(broker.client()));

    let p1 = publisher.clone();
    let p2 = publisher.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { p1.get_producer("topic-A").await }),
        tokio::spawn(async move { p2.get_producer("topic-A").await }),
    );
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    assert_eq!(broker.producers_created(), 1);
    assert_eq!(Arc::as_ptr(&a) as *const (), Arc::as_ptr(&b) as *const ());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publish_same_topic() {
    let broker = MemoryBroker::new(MemoryBrokerConfig {
        producer_latency: Duration::from_millis(10),
        ..MemoryBrokerConfig::default()
    });
    let publisher = Arc::new(Publisher::new(broker.client()));

    let mut handles = Vec::new();
    for task in 0..8 {
        let publisher = publisher.clone();
        handles.push(tokio::spawn(async move {
            let batch: Vec<Message> =
                (0..5).map(|i| message(&format!("task-{task}-{i}"))).collect();
            publisher.publish("shared", &batch).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(broker.producers_created(), 1);
    assert_eq!(broker.messages("shared").await.len(), 40);
}

#[tokio::test]
async fn send_failure_stops_batch() {
    let broker = MemoryBroker::default();
    broker.reject_sends_after(0).await;
    let publisher = Publisher::new(broker.client());

    let err = publisher.publish("t", &[message("m1"), message("m2")]).await.unwrap_err();
    match &err {
        PublisherError::Send { topic, message_uuid, source } => {
            assert_eq!(topic, "t");
            assert_eq!(message_uuid, "m1");
            assert_eq!(source.kind(), BrokerErrorKind::Send);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.broker_error().is_some());
    assert_eq!(broker.send_attempts(), 1, "m2 must not reach the producer");
    assert!(broker.messages("t").await.is_empty());
}

#[tokio::test]
async fn earlier_messages_are_not_rolled_back() {
    let broker = MemoryBroker::default();
    broker.reject_sends_after(1).await;
    let publisher = Publisher::new(broker.client());

    let err = publisher
        .publish("t", &[message("m1"), message("m2"), message("m3")])
        .await
        .unwrap_err();
    assert!(matches!(err, PublisherError::Send { ref message_uuid, .. } if message_uuid == "m2"));

    assert_eq!(broker.send_attempts(), 2, "m3 must not reach the producer");
    let log = broker.messages("t").await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].property(UUID_HEADER_KEY), Some("m1"));
}

#[tokio::test]
async fn reserved_key_fails_before_broker() {
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());

    let mut bad = message("bad");
    bad.metadata.set(UUID_HEADER_KEY, "other");

    let err = publisher.publish("t", &[bad, message("next")]).await.unwrap_err();
    assert!(matches!(err, PublisherError::Marshal(MarshalError::ReservedKey { .. })));
    assert_eq!(broker.producers_created(), 0);
    assert_eq!(broker.send_attempts(), 0);
    assert!(broker.messages("t").await.is_empty());
}

#[tokio::test]
async fn failed_producer_creation_is_not_cached() {
    let broker = MemoryBroker::default();
    broker.fail_producers_for("blocked").await;
    let publisher = Publisher::new(broker.client());

    for _ in 0..2 {
        let err = publisher.publish("blocked", &[message("x")]).await.unwrap_err();
        match err {
            PublisherError::ProducerCreation { topic, source } => {
                assert_eq!(topic, "blocked");
                assert_eq!(source.kind(), BrokerErrorKind::ProducerCreation);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(publisher.producer_count().await, 0);

    publisher.publish("open", &[message("y")]).await.unwrap();
    assert_eq!(publisher.producer_count().await, 1);
}

#[tokio::test]
async fn cancelled_message_is_not_sent() {
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());

    let token = CancellationToken::new();
    token.cancel();
    let cancelled = message("c1").with_context(MessageContext::new().with_cancel(token));

    let err = publisher.publish("t", &[cancelled, message("c2")]).await.unwrap_err();
    assert!(matches!(err, PublisherError::Cancelled { ref message_uuid } if message_uuid == "c1"));
    assert_eq!(broker.send_attempts(), 0);
    assert!(broker.messages("t").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_slow_send() {
    let broker = MemoryBroker::new(MemoryBrokerConfig {
        send_latency: Duration::from_millis(500),
        ..MemoryBrokerConfig::default()
    });
    let publisher = Publisher::new(broker.client());

    let token = CancellationToken::new();
    let msg = message("slow").with_context(MessageContext::new().with_cancel(token.clone()));
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = publisher.publish("t", &[msg]).await.unwrap_err();
    canceller.await.unwrap();
    assert!(matches!(err, PublisherError::Cancelled { .. }));
}

#[tokio::test(start_paused = true)]
async fn deadline_exceeded_during_slow_send() {
    let broker = MemoryBroker::new(MemoryBrokerConfig {
        send_latency: Duration::from_millis(500),
        ..MemoryBrokerConfig::default()
    });
    let publisher = Publisher::new(broker.client());

    let deadline = Instant::now() + Duration::from_millis(20);
    let msg = message("late").with_context(MessageContext::new().with_deadline(deadline));

    let err = publisher.publish("t", &[msg]).await.unwrap_err();
    assert!(matches!(err, PublisherError::DeadlineExceeded { ref message_uuid } if message_uuid == "late"));
}

#[tokio::test(start_paused = true)]
async fn deadline_in_future_allows_send() {
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());

    let msg = message("on-time").with_context(
        MessageContext::new().with_deadline(Instant::now() + Duration::from_secs(5)),
    );
    publisher.publish("t", &[msg]).await.unwrap();
    assert_eq!(broker.messages("t").await.len(), 1);
}

#[tokio::test]
async fn close_is_idempotent_and_blocks_publish() {
    init_tracing();
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());
    publisher.publish("t", &[message("before")]).await.unwrap();

    publisher.close().await.unwrap();
    assert!(publisher.is_closed());
    publisher.close().await.unwrap();

    let err = publisher.publish("t", &[message("after")]).await.unwrap_err();
    assert!(matches!(err, PublisherError::Closed));
    assert!(matches!(publisher.get_producer("t").await, Err(PublisherError::Closed)));
    assert_eq!(broker.messages("t").await.len(), 1);
}

#[tokio::test]
async fn close_failure_is_surfaced() {
    let broker = MemoryBroker::default();
    broker.fail_close();
    let publisher = Publisher::new(broker.client());

    let err = publisher.close().await.unwrap_err();
    assert!(matches!(err, PublisherError::Close(_)));
    assert!(publisher.is_closed());
    // second close does not retry the broker
    publisher.close().await.unwrap();
}

#[tokio::test]
async fn connect_from_config_with_json_envelope() {
    let broker = MemoryBroker::default();
    let config = PublisherConfig::from_toml_str(
        r#"
        marshaler = "json_envelope"

        [client]
        url = "memory://test"
        "#,
    )
    .unwrap();
    assert_eq!(config.marshaler, MarshalerKind::JsonEnvelope);

    let publisher = Publisher::connect(&config, &broker).await.unwrap();
    let msg = Message::new("env-1", vec![1u8, 2, 3]).with_metadata(
        [("source", "test")].into_iter().collect(),
    );
    publisher.publish("envelopes", std::slice::from_ref(&msg)).await.unwrap();

    let log = broker.messages("envelopes").await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].property("source"), None);
    assert_eq!(JsonEnvelopeMarshaler.unmarshal(&log[0]).unwrap(), msg);
}

#[tokio::test]
async fn connect_failure() {
    let broker = MemoryBroker::default();
    let config = PublisherConfig { client: ClientOptions::default(), ..PublisherConfig::default() };

    let err = match Publisher::connect(&config, &broker).await {
        Ok(_) => panic!("default url is not served by the memory broker"),
        Err(e) => e,
    };
    assert!(matches!(err, PublisherError::Connect(ref e) if e.kind() == BrokerErrorKind::Connection));
}

#[tokio::test]
async fn empty_batch_opens_nothing() {
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());
    publisher.publish("t", &[]).await.unwrap();
    assert_eq!(broker.producers_created(), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_follows_runtime_clock() {
    let broker = MemoryBroker::default();
    let publisher = Publisher::new(broker.client());

    let msg = message("stale").with_context(
        MessageContext::new().with_deadline(Instant::now() + Duration::from_secs(1)),
    );
    tokio::time::advance(Duration::from_secs(2)).await;

    let err = publisher.publish("t", &[msg]).await.unwrap_err();
    assert!(matches!(err, PublisherError::DeadlineExceeded { .. }));
    assert_eq!(broker.send_attempts(), 0);
}
