#![allow(dead_code)]

use pubsub_load::host::{
    sample_channel, MetricsRegistry, RunContext, RunState, SampleBatch, SampleReceiver, VuHandle,
};
use pubsub_load::memory::MemoryBroker;
use pubsub_load::{ClientConfig, Connection, Producer, ProducerConfig, PubSub};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One module instance wired to an in-memory broker and an active VU.
pub struct TestRun {
    pub broker: MemoryBroker,
    pub registry: MetricsRegistry,
    pub pubsub: PubSub,
    pub ctx: RunContext,
    pub rx: SampleReceiver,
}

pub fn test_run() -> TestRun {
    let broker = MemoryBroker::new();
    let registry = MetricsRegistry::new();
    let pubsub = PubSub::new(Arc::new(broker.connector()), &registry).unwrap();
    let (tx, rx) = sample_channel(1024);
    let ctx = RunContext::new(VuHandle::active(RunState::new(tx)), CancellationToken::new());

    TestRun {
        broker,
        registry,
        pubsub,
        ctx,
        rx,
    }
}

impl TestRun {
    pub async fn open(&self, topic: &str) -> (Connection, Producer) {
        let connection = self
            .pubsub
            .create_client(&ClientConfig::new("memory://test"))
            .await
            .unwrap();
        let producer = self
            .pubsub
            .create_producer(&connection, &ProducerConfig::new(topic))
            .await
            .unwrap();
        (connection, producer)
    }

    /// Receives the next batch or fails after `wait`.
    pub async fn next_batch(&mut self, wait: Duration) -> SampleBatch {
        tokio::time::timeout(wait, self.rx.recv())
            .await
            .expect("timed out waiting for samples")
            .expect("sample pipeline closed")
    }

    /// Drains whatever is queued right now.
    pub fn drain(&mut self) -> Vec<SampleBatch> {
        let mut batches = Vec::new();
        while let Ok(batch) = self.rx.try_recv() {
            batches.push(batch);
        }
        batches
    }
}
