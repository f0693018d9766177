//! Publish metrics and the reporter that turns a publish outcome into
//! tagged samples.

use crate::host::{
    Metric, MetricKind, MetricsRegistry, RunContext, Sample, SampleBatch, Tags, ValueType,
};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::trace;

pub const PUBLISH_MESSAGES: &str = "pubsub.publish.message.count";
pub const PUBLISH_BYTES: &str = "pubsub.publish.message.bytes";
pub const PUBLISH_ERRORS: &str = "pubsub.publish.error.count";

pub const TAG_PRODUCER_NAME: &str = "producer_name";
pub const TAG_TOPIC: &str = "topic";

/// Summary of one publish attempt. Built fresh per call and consumed by the
/// reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PublishOutcome {
    pub topic: String,
    pub producer_name: String,
    pub messages: u64,
    pub errors: u64,
    pub bytes: u64,
}

impl PublishOutcome {
    pub fn attempt(topic: &str, producer_name: &str, payload_len: usize) -> Self {
        Self {
            topic: topic.to_string(),
            producer_name: producer_name.to_string(),
            messages: 1,
            errors: 0,
            bytes: payload_len as u64,
        }
    }

    pub fn completed(mut self, failed: bool) -> Self {
        self.errors = u64::from(failed);
        self
    }
}

/// Handles to the three publish counters of one module instance.
#[derive(Debug, Clone)]
pub struct PublishMetrics {
    messages: Arc<Metric>,
    bytes: Arc<Metric>,
    errors: Arc<Metric>,
}

impl PublishMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            messages: registry.new_metric(
                PUBLISH_MESSAGES,
                MetricKind::Counter,
                ValueType::Default,
            )?,
            bytes: registry.new_metric(PUBLISH_BYTES, MetricKind::Counter, ValueType::Data)?,
            errors: registry.new_metric(
                PUBLISH_ERRORS,
                MetricKind::Counter,
                ValueType::Default,
            )?,
        })
    }

    pub(crate) fn samples(&self, outcome: &PublishOutcome) -> SampleBatch {
        let tags = Tags::new()
            .with(TAG_PRODUCER_NAME, outcome.producer_name.as_str())
            .with(TAG_TOPIC, outcome.topic.as_str());
        let time = Utc::now();

        let sample = |metric: &Arc<Metric>, value: u64| Sample {
            metric: Arc::clone(metric),
            tags: tags.clone(),
            value: value as f64,
            time,
        };

        SampleBatch {
            samples: vec![
                sample(&self.messages, outcome.messages),
                sample(&self.bytes, outcome.bytes),
                sample(&self.errors, outcome.errors),
            ],
        }
    }

    /// Emits the outcome's samples into the run's pipeline.
    ///
    /// The active state is checked here again because asynchronous
    /// completions call this long after the issuing iteration moved on.
    /// A finished run drops the samples without error.
    pub(crate) async fn report(&self, ctx: &RunContext, outcome: &PublishOutcome) -> Result<()> {
        let state = ctx.state().ok_or(Error::NoActiveState)?;

        let batch = self.samples(outcome);
        if !state.push_if_not_done(ctx.done(), batch).await {
            trace!(
                topic = %outcome.topic,
                producer = %outcome.producer_name,
                "Run already finished, publish samples dropped"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{sample_channel, RunState, VuHandle};
    use tokio_util::sync::CancellationToken;

    fn outcome(failed: bool) -> PublishOutcome {
        PublishOutcome::attempt("orders", "orders-producer-1", 64).completed(failed)
    }

    #[test]
    fn test_outcome_counts() {
        let ok = outcome(false);
        assert_eq!((ok.messages, ok.bytes, ok.errors), (1, 64, 0));
        let failed = outcome(true);
        assert_eq!((failed.messages, failed.bytes, failed.errors), (1, 64, 1));
    }

    #[test]
    fn test_samples_are_a_tagged_triple() {
        let registry = MetricsRegistry::new();
        let metrics = PublishMetrics::register(&registry).unwrap();
        let batch = metrics.samples(&outcome(true));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.value_of(PUBLISH_MESSAGES), Some(1.0));
        assert_eq!(batch.value_of(PUBLISH_BYTES), Some(64.0));
        assert_eq!(batch.value_of(PUBLISH_ERRORS), Some(1.0));
        for sample in &batch.samples {
            assert_eq!(sample.tags.get(TAG_TOPIC), Some("orders"));
            assert_eq!(sample.tags.get(TAG_PRODUCER_NAME), Some("orders-producer-1"));
        }
        assert_eq!(
            registry.get(PUBLISH_BYTES).map(|m| m.value_type),
            Some(ValueType::Data)
        );
    }

    #[tokio::test]
    async fn test_report_requires_active_state() {
        let metrics = PublishMetrics::register(&MetricsRegistry::new()).unwrap();
        let ctx = RunContext::new(VuHandle::new(), CancellationToken::new());
        let err = metrics.report(&ctx, &outcome(false)).await.unwrap_err();
        assert!(matches!(err, Error::NoActiveState));
    }

    #[tokio::test]
    async fn test_report_pushes_one_batch() {
        let metrics = PublishMetrics::register(&MetricsRegistry::new()).unwrap();
        let (tx, mut rx) = sample_channel(4);
        let ctx = RunContext::new(VuHandle::active(RunState::new(tx)), CancellationToken::new());

        metrics.report(&ctx, &outcome(false)).await.unwrap();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.value_of(PUBLISH_ERRORS), Some(0.0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_report_after_run_end_is_silent() {
        let metrics = PublishMetrics::register(&MetricsRegistry::new()).unwrap();
        let (tx, mut rx) = sample_channel(4);
        let done = CancellationToken::new();
        let ctx = RunContext::new(VuHandle::active(RunState::new(tx)), done.clone());
        done.cancel();

        assert!(metrics.report(&ctx, &outcome(false)).await.is_ok());
        assert!(rx.try_recv().is_err());
    }
}
