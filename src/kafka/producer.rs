use crate::client::{BrokerProducer, MessageId, OutboundMessage, SendCallback, SendResult};
use crate::error::BoxError;
use crate::Error;
use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::trace;

pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    name: String,
    send_timeout: Duration,
    in_flight: TaskTracker,
}

impl KafkaProducer {
    pub fn new(
        producer: FutureProducer,
        topic: String,
        name: String,
        send_timeout: Duration,
    ) -> Self {
        Self {
            producer,
            topic,
            name,
            send_timeout,
            in_flight: TaskTracker::new(),
        }
    }
}

fn headers(properties: &HashMap<String, String>) -> OwnedHeaders {
    properties
        .iter()
        .fold(OwnedHeaders::new_with_capacity(properties.len()), |headers, (k, v)| {
            headers.insert(Header {
                key: k.as_str(),
                value: Some(v.as_str()),
            })
        })
}

fn kafka_error(e: rdkafka::error::KafkaError) -> BoxError {
    Box::new(Error::Kafka(e))
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: OutboundMessage) -> SendResult {
        let record = FutureRecord::<(), [u8]>::to(&self.topic)
            .payload(&message.payload[..])
            .headers(headers(&message.properties));

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| kafka_error(e))?;

        Ok(MessageId { partition, offset })
    }

    /// Enqueues without waiting for queue space or delivery. The completion
    /// runs on its own tokio task once librdkafka reports the delivery.
    fn send_async(&self, message: OutboundMessage, on_complete: SendCallback) {
        let record = FutureRecord::<(), [u8]>::to(&self.topic)
            .payload(&message.payload[..])
            .headers(headers(&message.properties));

        match self.producer.send_result(record) {
            Ok(delivery) => {
                self.in_flight.spawn(async move {
                    let result = match delivery.await {
                        Ok(Ok((partition, offset))) => Ok(MessageId { partition, offset }),
                        Ok(Err((e, _))) => Err(kafka_error(e)),
                        Err(canceled) => Err(Box::new(canceled) as BoxError),
                    };
                    on_complete(result).await;
                });
            }
            Err((e, _)) => {
                trace!(topic = %self.topic, error = %e, "Async send rejected at enqueue");
                let err = kafka_error(e);
                self.in_flight.spawn(async move { on_complete(Err(err)).await });
            }
        }
    }

    /// Flushes outstanding messages for up to one send timeout, then waits
    /// for their completion handlers.
    async fn close(&self) -> Result<(), BoxError> {
        let producer = self.producer.clone();
        let timeout = self.send_timeout;
        let flushed =
            tokio::task::spawn_blocking(move || producer.flush(timeout).map_err(kafka_error))
                .await
                .map_err(|e| Box::new(e) as BoxError)?;

        self.in_flight.close();
        self.in_flight.wait().await;
        flushed
    }
}
