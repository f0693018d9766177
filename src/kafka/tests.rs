use super::*;
use crate::client::{self, BrokerConnector, OutboundMessage};
use crate::config::{ClientConfig, ProducerConfig};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

fn test_brokers() -> String {
    std::env::var("TEST_KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string())
}

fn create_test_client_config() -> ClientConfig {
    ClientConfig {
        url: test_brokers(),
        connection_timeout: Some(Duration::from_secs(5)),
    }
}

#[test]
fn test_bootstrap_servers_parsing() {
    assert_eq!(bootstrap_servers("localhost:9092"), "localhost:9092");
    assert_eq!(bootstrap_servers("kafka://a:9092, b:9092/"), "a:9092,b:9092");
    assert_eq!(bootstrap_servers("kafka://"), "");
}

#[tokio::test]
async fn test_connect_without_servers_fails_fast() {
    let options = ClientConfig::new("kafka://").resolve();
    let result = KafkaConnector::new().connect(&options).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_sub_second_timeout_reaches_the_cluster_probe() {
    let options = ClientConfig {
        url: "localhost:1".to_string(),
        connection_timeout: Some(Duration::from_millis(500)),
    }
    .resolve();
    let err = match KafkaConnector::new().connect(&options).await {
        Ok(_) => panic!("nothing listens on localhost:1"),
        Err(e) => e.to_string(),
    };
    assert!(
        !err.contains("socket.connection.setup.timeout.ms"),
        "client config was rejected: {}",
        err
    );
}

#[tokio::test]
#[ignore] // Needs a closed local port and waits for the connection timeout
async fn test_connect_unreachable_cluster() {
    let config = ClientConfig {
        url: "localhost:1".to_string(),
        connection_timeout: Some(Duration::from_millis(500)),
    };
    let err = client::create_client(&KafkaConnector::new(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, crate::Error::Connection { .. }));
}

#[tokio::test]
#[ignore] // Requires running Kafka
async fn test_sync_send_with_properties() {
    let connection = client::create_client(&KafkaConnector::new(), &create_test_client_config())
        .await
        .unwrap();
    let producer = client::create_producer(&connection, &ProducerConfig::new("pubsub-load-test"))
        .await
        .unwrap();
    assert!(producer.name().starts_with("pubsub-load-test-"));

    let message = OutboundMessage {
        payload: Bytes::from(vec![0u8; 64]),
        properties: HashMap::from([("run".to_string(), "it".to_string())]),
    };
    let id = producer.inner().send(message).await.unwrap();
    assert!(id.offset >= 0);

    client::close_producer(producer).await;
    client::close_client(connection).await;
}

#[tokio::test]
#[ignore] // Requires running Kafka
async fn test_async_send_completes() {
    let connection = client::create_client(&KafkaConnector::new(), &create_test_client_config())
        .await
        .unwrap();
    let producer = client::create_producer(&connection, &ProducerConfig::new("pubsub-load-test"))
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    producer.inner().send_async(
        OutboundMessage {
            payload: Bytes::from_static(b"async"),
            properties: HashMap::new(),
        },
        Box::new(move |result: crate::client::SendResult| {
            use futures::FutureExt;
            async move {
                let _ = tx.send(result.is_ok());
            }
            .boxed()
        }),
    );

    let delivered = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .unwrap()
        .unwrap();
    assert!(delivered);

    client::close_producer(producer).await;
    client::close_client(connection).await;
}
