//! Boundary to the messaging client and the connection factory built on it.
//!
//! The broker client itself (wire protocol, batching, retries) lives behind
//! [`BrokerConnector`], [`BrokerClient`] and [`BrokerProducer`]. This module
//! resolves configuration, opens handles through those traits and tears them
//! down again.

use crate::config::{ClientConfig, ClientOptions, ProducerConfig, ProducerOptions};
use crate::error::BoxError;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Message envelope handed to a producer.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub payload: Bytes,
    pub properties: HashMap<String, String>,
}

/// Broker-assigned position of an acknowledged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageId {
    pub partition: i32,
    pub offset: i64,
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.offset)
    }
}

pub type SendResult = std::result::Result<MessageId, BoxError>;

/// Completion handler for an asynchronous send.
///
/// Invoked exactly once, on an execution context owned by the client.
pub type SendCallback = Box<dyn FnOnce(SendResult) -> BoxFuture<'static, ()> + Send + 'static>;

/// Opens broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(
        &self,
        options: &ClientOptions,
    ) -> std::result::Result<Arc<dyn BrokerClient>, BoxError>;
}

/// A live broker connection.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn create_producer(
        &self,
        options: &ProducerOptions,
    ) -> std::result::Result<Arc<dyn BrokerProducer>, BoxError>;

    async fn close(&self) -> std::result::Result<(), BoxError>;
}

/// A producer bound to one topic.
///
/// Implementations must be safe for concurrent use; the core adds no
/// synchronization of its own.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    fn topic(&self) -> &str;

    fn name(&self) -> &str;

    /// Sends and waits for the acknowledgment or the producer's send timeout.
    async fn send(&self, message: OutboundMessage) -> SendResult;

    /// Enqueues the message and returns without waiting.
    fn send_async(&self, message: OutboundMessage, on_complete: SendCallback);

    async fn close(&self) -> std::result::Result<(), BoxError>;
}

/// Connection handle owned by the caller. Closed once via
/// [`close_client`].
pub struct Connection {
    url: String,
    client: Arc<dyn BrokerClient>,
}

impl Connection {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("url", &self.url).finish()
    }
}

/// Producer handle owned by the caller. Must not outlive its
/// [`Connection`]; closed once via [`close_producer`].
pub struct Producer {
    inner: Arc<dyn BrokerProducer>,
}

impl Producer {
    pub fn topic(&self) -> &str {
        self.inner.topic()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub(crate) fn inner(&self) -> &dyn BrokerProducer {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("topic", &self.topic())
            .field("name", &self.name())
            .finish()
    }
}

/// Opens one connection. No retries: the first failure is returned.
#[instrument(skip(connector, config), fields(url = %config.url))]
pub async fn create_client(
    connector: &dyn BrokerConnector,
    config: &ClientConfig,
) -> Result<Connection> {
    let options = config.resolve();

    let client = connector
        .connect(&options)
        .await
        .map_err(|source| Error::Connection { source })?;

    info!(
        timeout_ms = options.connection_timeout.as_millis() as u64,
        "Broker connection established"
    );
    Ok(Connection {
        url: options.url,
        client,
    })
}

#[instrument(skip(connection, config), fields(url = %connection.url, topic = %config.topic))]
pub async fn create_producer(connection: &Connection, config: &ProducerConfig) -> Result<Producer> {
    let options = config.resolve();
    if options.topic.trim().is_empty() {
        return Err(Error::InvalidConfig {
            message: "producer topic must not be empty".to_string(),
        });
    }

    let inner = connection
        .client
        .create_producer(&options)
        .await
        .map_err(|source| Error::ProducerCreation {
            topic: options.topic.clone(),
            source,
        })?;

    info!(
        producer = %inner.name(),
        batching_max_messages = options.batching_max_messages,
        max_pending_messages = options.max_pending_messages,
        send_timeout_ms = options.send_timeout.as_millis() as u64,
        compression = ?options.compression,
        "Producer created"
    );
    Ok(Producer { inner })
}

/// Best-effort teardown. A failed close is only logged.
pub async fn close_producer(producer: Producer) {
    if let Err(e) = producer.inner.close().await {
        debug!(
            topic = %producer.topic(),
            producer = %producer.name(),
            error = %e,
            "Ignoring producer close error"
        );
    }
}

/// Best-effort teardown. A failed close is only logged.
pub async fn close_client(connection: Connection) {
    if let Err(e) = connection.client.close().await {
        debug!(url = %connection.url, error = %e, "Ignoring client close error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use std::time::Duration;

    #[tokio::test]
    async fn test_create_client_applies_default_timeout() {
        let broker = MemoryBroker::new();
        let connector = broker.connector();
        let connection = create_client(&connector, &ClientConfig::new("memory://local"))
            .await
            .unwrap();
        assert_eq!(connection.url(), "memory://local");
        assert_eq!(
            broker.last_client_options().map(|o| o.connection_timeout),
            Some(Duration::from_secs(3))
        );
    }

    #[tokio::test]
    async fn test_create_client_unreachable() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        let err = create_client(&broker.connector(), &ClientConfig::new("memory://local"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(broker.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_empty_topic_rejected_locally() {
        let broker = MemoryBroker::new();
        let connection = create_client(&broker.connector(), &ClientConfig::new("memory://local"))
            .await
            .unwrap();

        let err = create_producer(&connection, &ProducerConfig::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert_eq!(broker.producers_created(), 0);
    }

    #[tokio::test]
    async fn test_producer_options_are_resolved() {
        let broker = MemoryBroker::new();
        let connection = create_client(&broker.connector(), &ClientConfig::new("memory://local"))
            .await
            .unwrap();
        let producer = create_producer(&connection, &ProducerConfig::new("orders"))
            .await
            .unwrap();

        assert_eq!(producer.topic(), "orders");
        assert!(!producer.name().is_empty());
        let options = broker.last_producer_options().unwrap();
        assert_eq!(options.batching_max_messages, 100);
        assert_eq!(options.max_pending_messages, 100);
        assert_eq!(options.send_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_producer_creation_failure() {
        let broker = MemoryBroker::new();
        let connection = create_client(&broker.connector(), &ClientConfig::new("memory://local"))
            .await
            .unwrap();
        broker.set_reachable(false);

        let err = create_producer(&connection, &ProducerConfig::new("orders"))
            .await
            .unwrap_err();
        match err {
            Error::ProducerCreation { topic, .. } => assert_eq!(topic, "orders"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_close_swallows_errors() {
        let broker = MemoryBroker::new();
        let connection = create_client(&broker.connector(), &ClientConfig::new("memory://local"))
            .await
            .unwrap();
        let producer = create_producer(&connection, &ProducerConfig::new("orders"))
            .await
            .unwrap();

        broker.fail_closes(true);
        close_producer(producer).await;
        close_client(connection).await;
        assert_eq!(broker.producers_closed(), 1);
        assert_eq!(broker.clients_closed(), 1);
    }
}
