//! Integration test for the Kafka delta publisher
//!
//! Prerequisites:
//! - Kafka broker reachable at KAFKA_BROKERS (topic auto-creation enabled)
//!
//! Run tests:
//! ```bash
//! export KAFKA_BROKERS="localhost:9092"
//! cargo test --package counter-propagation --test kafka_integration_test -- --ignored
//! ```

use counter_propagation::{
    CounterKind, DeltaEvent, DeltaPublisher, KafkaDeltaPublisher, PropagationConfig,
    DELTA_ID_HEADER,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use std::time::Duration;

fn test_config() -> PropagationConfig {
    PropagationConfig {
        brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
        topic_prefix: format!("it-{}", uuid::Uuid::new_v4().simple()),
        group_id: format!("it-group-{}", uuid::Uuid::new_v4().simple()),
        delivery_timeout: Duration::from_secs(10),
    }
}

#[ignore = "Requires Kafka broker"]
#[tokio::test]
async fn test_emit_writes_key_value_and_delta_id() {
    let config = test_config();
    let publisher = KafkaDeltaPublisher::new(&config).expect("Failed to create producer");
    let event = DeltaEvent::decrement(CounterKind::VideoCommentCount, 42);

    publisher.emit(&event).await.expect("emit failed");

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Failed to create consumer");
    let topic = format!("{}.counter.video_comment_count", config.topic_prefix);
    consumer.subscribe(&[&topic]).unwrap();

    let message = tokio::time::timeout(Duration::from_secs(30), consumer.recv())
        .await
        .expect("timed out waiting for delta")
        .expect("Kafka error");

    assert_eq!(message.key(), Some(&b"42"[..]));
    assert_eq!(message.payload(), Some(&b"-1"[..]));

    let delta_id = message
        .headers()
        .and_then(|h| h.iter().find(|h| h.key == DELTA_ID_HEADER))
        .and_then(|h| h.value)
        .map(|v| String::from_utf8(v.to_vec()).unwrap());
    assert_eq!(delta_id, event.delta_id.map(|id| id.to_string()));
}
