//! Minimal model of the load-test host that drives this crate.
//!
//! The host owns the metric registry, the sample pipeline and the per-VU run
//! state. The publish engine only ever pushes [`SampleBatch`]es into it.

pub mod registry;
pub mod sample;
pub mod state;
pub mod summary;

pub use registry::{Metric, MetricKind, MetricsRegistry, ValueType};
pub use sample::{Sample, SampleBatch, Tags};
pub use state::{sample_channel, RunContext, RunState, SampleReceiver, SampleSender, VuHandle};
pub use summary::{MetricTotal, SampleSummary};
