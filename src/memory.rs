//! In-process broker used by tests and the driver's dry-run mode.
//!
//! Behaves like a remote broker from the core's point of view: sends complete
//! after an optional acknowledgment delay, asynchronous completions run on
//! their own tokio task, and the broker can be made unreachable or told to
//! fail sends and closes.

use crate::client::{
    BrokerClient, BrokerConnector, BrokerProducer, MessageId, OutboundMessage, SendCallback,
    SendResult,
};
use crate::config::{ClientOptions, ProducerOptions};
use crate::error::BoxError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// A message the broker accepted.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: MessageId,
    pub producer_name: String,
    pub message: OutboundMessage,
}

#[derive(Debug, Default)]
struct BrokerState {
    unreachable: AtomicBool,
    fail_sends: AtomicBool,
    fail_closes: AtomicBool,
    ack_delay_ms: AtomicU64,
    connect_attempts: AtomicUsize,
    producers_created: AtomicUsize,
    producers_closed: AtomicUsize,
    clients_closed: AtomicUsize,
    last_client_options: Mutex<Option<ClientOptions>>,
    last_producer_options: Mutex<Option<ProducerOptions>>,
    topics: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl BrokerState {
    fn check_reachable(&self) -> Result<(), BoxError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err("broker unreachable: connection refused".into())
        } else {
            Ok(())
        }
    }

    fn store(&self, topic: &str, producer_name: &str, message: OutboundMessage) -> MessageId {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let log = topics.entry(topic.to_string()).or_default();
        let id = MessageId {
            partition: 0,
            offset: log.len() as i64,
        };
        log.push(StoredMessage {
            id,
            producer_name: producer_name.to_string(),
            message,
        });
        id
    }
}

/// Shared handle to an in-memory broker. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            state: Arc::clone(&self.state),
        }
    }

    /// An unreachable broker refuses connections, producer creation and sends.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.state.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Delay before a send is acknowledged. Delays at or above the producer's
    /// send timeout make the send time out.
    pub fn set_ack_delay(&self, delay: Duration) {
        self.state
            .ack_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn messages(&self, topic: &str) -> Vec<StoredMessage> {
        let topics = self.state.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.get(topic).cloned().unwrap_or_default()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn producers_created(&self) -> usize {
        self.state.producers_created.load(Ordering::SeqCst)
    }

    pub fn producers_closed(&self) -> usize {
        self.state.producers_closed.load(Ordering::SeqCst)
    }

    pub fn clients_closed(&self) -> usize {
        self.state.clients_closed.load(Ordering::SeqCst)
    }

    pub fn last_client_options(&self) -> Option<ClientOptions> {
        self.state
            .last_client_options
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_producer_options(&self) -> Option<ProducerOptions> {
        self.state
            .last_producer_options
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<BrokerState>,
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(&self, options: &ClientOptions) -> Result<Arc<dyn BrokerClient>, BoxError> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        *self
            .state
            .last_client_options
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(options.clone());

        if options.url.is_empty() {
            return Err("broker url must not be empty".into());
        }
        self.state.check_reachable()?;

        Ok(Arc::new(MemoryClient {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryClient {
    state: Arc<BrokerState>,
}

#[async_trait]
impl BrokerClient for MemoryClient {
    async fn create_producer(
        &self,
        options: &ProducerOptions,
    ) -> Result<Arc<dyn BrokerProducer>, BoxError> {
        *self
            .state
            .last_producer_options
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(options.clone());
        self.state.check_reachable()?;

        let seq = self.state.producers_created.fetch_add(1, Ordering::SeqCst);
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| format!("memory-{}-{}", options.topic, seq));

        Ok(Arc::new(MemoryProducer {
            inner: Arc::new(ProducerInner {
                state: Arc::clone(&self.state),
                topic: options.topic.clone(),
                name,
                send_timeout: options.send_timeout,
            }),
            in_flight: TaskTracker::new(),
        }))
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.state.clients_closed.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_closes.load(Ordering::SeqCst) {
            return Err("client close failed".into());
        }
        Ok(())
    }
}

struct ProducerInner {
    state: Arc<BrokerState>,
    topic: String,
    name: String,
    send_timeout: Duration,
}

impl ProducerInner {
    async fn deliver(&self, message: OutboundMessage) -> SendResult {
        let delay = Duration::from_millis(self.state.ack_delay_ms.load(Ordering::SeqCst));
        if delay >= self.send_timeout {
            tokio::time::sleep(self.send_timeout).await;
            return Err(format!("send timed out after {:?}", self.send_timeout).into());
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.state.check_reachable()?;
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err("broker rejected message".into());
        }
        Ok(self.state.store(&self.topic, &self.name, message))
    }
}

struct MemoryProducer {
    inner: Arc<ProducerInner>,
    in_flight: TaskTracker,
}

#[async_trait]
impl BrokerProducer for MemoryProducer {
    fn topic(&self) -> &str {
        &self.inner.topic
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn send(&self, message: OutboundMessage) -> SendResult {
        self.inner.deliver(message).await
    }

    fn send_async(&self, message: OutboundMessage, on_complete: SendCallback) {
        let inner = Arc::clone(&self.inner);
        self.in_flight.spawn(async move {
            let result = inner.deliver(message).await;
            on_complete(result).await;
        });
    }

    /// Waits for in-flight asynchronous sends before closing.
    async fn close(&self) -> Result<(), BoxError> {
        self.in_flight.close();
        self.in_flight.wait().await;
        self.inner.state.producers_closed.fetch_add(1, Ordering::SeqCst);
        if self.inner.state.fail_closes.load(Ordering::SeqCst) {
            return Err("producer close failed".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, ProducerConfig};
    use futures::FutureExt;
    use tokio::sync::oneshot;

    async fn producer(broker: &MemoryBroker, config: ProducerConfig) -> Arc<dyn BrokerProducer> {
        let client = broker
            .connector()
            .connect(&ClientConfig::new("memory://test").resolve())
            .await
            .unwrap();
        client.create_producer(&config.resolve()).await.unwrap()
    }

    fn message(payload: &'static [u8]) -> OutboundMessage {
        OutboundMessage {
            payload: bytes::Bytes::from_static(payload),
            properties: HashMap::from([("k".to_string(), "v".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_send_stores_message() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker, ProducerConfig::new("t")).await;

        let first = producer.send(message(b"one")).await.unwrap();
        let second = producer.send(message(b"two")).await.unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);

        let stored = broker.messages("t");
        assert_eq!(stored.len(), 2);
        assert_eq!(&stored[1].message.payload[..], b"two");
        assert_eq!(stored[0].message.properties.get("k").map(String::as_str), Some("v"));
        assert_eq!(stored[0].producer_name, producer.name());
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let broker = MemoryBroker::new();
        broker.set_ack_delay(Duration::from_millis(200));
        let config = ProducerConfig {
            send_timeout: Some(Duration::from_millis(10)),
            ..ProducerConfig::new("t")
        };
        let producer = producer(&broker, config).await;

        let err = producer.send(message(b"late")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(broker.messages("t").is_empty());
    }

    #[tokio::test]
    async fn test_send_async_invokes_callback_once() {
        let broker = MemoryBroker::new();
        broker.fail_sends(true);
        let producer = producer(&broker, ProducerConfig::new("t")).await;

        let (tx, rx) = oneshot::channel();
        producer.send_async(
            message(b"x"),
            Box::new(move |result: SendResult| {
                async move {
                    let _ = tx.send(result.is_err());
                }
                .boxed()
            }),
        );
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_sends() {
        let broker = MemoryBroker::new();
        broker.set_ack_delay(Duration::from_millis(30));
        let producer = producer(&broker, ProducerConfig::new("t")).await;

        for _ in 0..3 {
            producer.send_async(message(b"x"), Box::new(|_: SendResult| async {}.boxed()));
        }
        producer.close().await.unwrap();
        assert_eq!(broker.messages("t").len(), 3);
        assert_eq!(broker.producers_closed(), 1);
    }
}
