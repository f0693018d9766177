use super::sample::SampleBatch;
use super::state::SampleReceiver;
use serde::Serialize;
use std::collections::BTreeMap;

/// Running total of one metric for one tag set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTotal {
    pub metric: String,
    pub tags: BTreeMap<String, String>,
    pub value: f64,
    pub samples: u64,
}

/// End-of-run aggregation of everything drained from the sample pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleSummary {
    pub batches: u64,
    pub samples: u64,
    pub series: Vec<MetricTotal>,
}

impl SampleSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the pipeline until every sender is gone.
    pub async fn collect(mut rx: SampleReceiver) -> Self {
        let mut summary = Self::new();
        while let Some(batch) = rx.recv().await {
            summary.record(&batch);
        }
        summary
    }

    pub fn record(&mut self, batch: &SampleBatch) {
        self.batches += 1;
        for sample in &batch.samples {
            self.samples += 1;
            let tags: BTreeMap<String, String> = sample
                .tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            match self
                .series
                .iter_mut()
                .find(|t| t.metric == sample.metric.name && t.tags == tags)
            {
                Some(total) => {
                    total.value += sample.value;
                    total.samples += 1;
                }
                None => self.series.push(MetricTotal {
                    metric: sample.metric.name.clone(),
                    tags,
                    value: sample.value,
                    samples: 1,
                }),
            }
        }
    }

    /// Sum of a metric across all tag sets.
    pub fn total(&self, metric: &str) -> f64 {
        self.series
            .iter()
            .filter(|t| t.metric == metric)
            .map(|t| t.value)
            .sum()
    }

    pub fn series_for<'a>(&'a self, metric: &'a str) -> impl Iterator<Item = &'a MetricTotal> + 'a {
        self.series.iter().filter(move |t| t.metric == metric)
    }
}
