use super::producer::KafkaProducer;
use crate::client::{BrokerClient, BrokerConnector, BrokerProducer};
use crate::config::{ClientOptions, ProducerOptions};
use crate::error::BoxError;
use crate::Error;
use async_trait::async_trait;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::producer::{FutureProducer, Producer};
use rdkafka::ClientConfig as KafkaClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// librdkafka rejects `socket.connection.setup.timeout.ms` below one second.
const MIN_SOCKET_SETUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens Kafka connections from resolved [`ClientOptions`].
#[derive(Debug, Clone, Default)]
pub struct KafkaConnector;

impl KafkaConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    /// Builds the shared client settings and probes cluster metadata once,
    /// so an unreachable cluster fails here instead of on the first send.
    async fn connect(&self, options: &ClientOptions) -> Result<Arc<dyn BrokerClient>, BoxError> {
        let servers = super::bootstrap_servers(&options.url);
        if servers.is_empty() {
            return Err(Box::new(Error::InvalidConfig {
                message: format!("no bootstrap servers in '{}'", options.url),
            }));
        }

        let mut base = KafkaClientConfig::new();
        base.set("bootstrap.servers", &servers)
            .set(
                "socket.connection.setup.timeout.ms",
                socket_setup_timeout_ms(options.connection_timeout),
            )
            .set_log_level(RDKafkaLogLevel::Error);

        let probe: FutureProducer = base.create().map_err(Error::Kafka)?;
        fetch_metadata(probe, None, options.connection_timeout).await?;

        info!(bootstrap = %servers, "Kafka cluster reachable");
        Ok(Arc::new(KafkaClient {
            base,
            connection_timeout: options.connection_timeout,
        }))
    }
}

/// Shared settings of one Kafka connection. Every producer created from it
/// gets its own librdkafka handle.
pub struct KafkaClient {
    base: KafkaClientConfig,
    connection_timeout: Duration,
}

#[async_trait]
impl BrokerClient for KafkaClient {
    async fn create_producer(
        &self,
        options: &ProducerOptions,
    ) -> Result<Arc<dyn BrokerProducer>, BoxError> {
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| generated_name(&options.topic));

        let producer: FutureProducer = self
            .base
            .clone()
            .set("client.id", &name)
            .set("compression.type", options.compression.kafka_codec())
            .set("batch.num.messages", options.batching_max_messages.to_string())
            .set(
                "queue.buffering.max.messages",
                options.max_pending_messages.to_string(),
            )
            .set("message.timeout.ms", options.send_timeout.as_millis().to_string())
            .create()
            .map_err(Error::Kafka)?;

        // Also triggers topic auto-creation where the cluster allows it.
        fetch_metadata(
            producer.clone(),
            Some(options.topic.clone()),
            self.connection_timeout,
        )
        .await?;

        Ok(Arc::new(KafkaProducer::new(
            producer,
            options.topic.clone(),
            name,
            options.send_timeout,
        )))
    }

    /// librdkafka handles are released on drop; nothing to flush here.
    async fn close(&self) -> Result<(), BoxError> {
        debug!("Kafka client closed");
        Ok(())
    }
}

async fn fetch_metadata(
    producer: FutureProducer,
    topic: Option<String>,
    timeout: Duration,
) -> Result<(), BoxError> {
    tokio::task::spawn_blocking(move || {
        producer
            .client()
            .fetch_metadata(topic.as_deref(), timeout)
            .map(|_| ())
            .map_err(|e| Box::new(Error::Kafka(e)) as BoxError)
    })
    .await
    .map_err(|e| Box::new(e) as BoxError)?
}

/// The metadata probe enforces the configured timeout; the socket setting
/// only has to stay inside librdkafka's accepted range.
pub(crate) fn socket_setup_timeout_ms(timeout: Duration) -> String {
    timeout.max(MIN_SOCKET_SETUP_TIMEOUT).as_millis().to_string()
}

fn generated_name(topic: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", topic, &id[..8])
}
