//! The module instance a host creates per logical unit of work.
//!
//! # Example
//!
//! ```rust,no_run
//! use pubsub_load::config::{ClientConfig, ProducerConfig};
//! use pubsub_load::host::{sample_channel, MetricsRegistry, RunContext, RunState, VuHandle};
//! use pubsub_load::kafka::KafkaConnector;
//! use pubsub_load::PubSub;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> pubsub_load::Result<()> {
//!     let registry = MetricsRegistry::new();
//!     let pubsub = PubSub::new(Arc::new(KafkaConnector::new()), &registry)?;
//!
//!     let (samples, _rx) = sample_channel(1024);
//!     let vu = VuHandle::active(RunState::new(samples));
//!     let ctx = RunContext::new(vu, CancellationToken::new());
//!
//!     let connection = pubsub.create_client(&ClientConfig::new("localhost:9092")).await?;
//!     let producer = pubsub.create_producer(&connection, &ProducerConfig::new("bench")).await?;
//!     pubsub.publish(&ctx, &producer, vec![0u8; 64], HashMap::new(), false).await?;
//!
//!     pubsub.close_producer(producer).await;
//!     pubsub.close_client(connection).await;
//!     Ok(())
//! }
//! ```

use crate::client::{self, BrokerConnector, Connection, Producer};
use crate::config::{ClientConfig, ProducerConfig};
use crate::host::MetricsRegistry;
use crate::metrics::PublishMetrics;
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// Entry points exposed to load scripts.
///
/// Carries its own metric handles; nothing is registered process-wide.
/// Cloning is cheap and shares the connector and metrics.
#[derive(Clone)]
pub struct PubSub {
    connector: Arc<dyn BrokerConnector>,
    pub(crate) metrics: PublishMetrics,
}

impl PubSub {
    /// Registers the publish metrics with `registry`.
    pub fn new(connector: Arc<dyn BrokerConnector>, registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            connector,
            metrics: PublishMetrics::register(registry)?,
        })
    }

    pub async fn create_client(&self, config: &ClientConfig) -> Result<Connection> {
        client::create_client(self.connector.as_ref(), config).await
    }

    pub async fn create_producer(
        &self,
        connection: &Connection,
        config: &ProducerConfig,
    ) -> Result<Producer> {
        client::create_producer(connection, config).await
    }

    pub async fn close_producer(&self, producer: Producer) {
        client::close_producer(producer).await
    }

    pub async fn close_client(&self, connection: Connection) {
        client::close_client(connection).await
    }
}

impl fmt::Debug for PubSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSub").field("metrics", &self.metrics).finish()
    }
}
