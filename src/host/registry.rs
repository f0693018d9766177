use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

const MAX_METRIC_NAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Trend,
    Rate,
}

/// How the host should render a metric's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Default,
    Time,
    Data,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub name: String,
    pub kind: MetricKind,
    pub value_type: ValueType,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Registry of metrics known to a run.
///
/// Registering the same name twice with the same kind returns the existing
/// handle, so every module instance can register its metrics independently.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: Mutex<HashMap<String, Arc<Metric>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_metric(
        &self,
        name: &str,
        kind: MetricKind,
        value_type: ValueType,
    ) -> Result<Arc<Metric>> {
        validate_name(name)?;

        let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = metrics.get(name) {
            if existing.kind != kind || existing.value_type != value_type {
                return Err(Error::MetricRegistration {
                    message: format!(
                        "metric '{}' already registered as {:?}/{:?}",
                        name, existing.kind, existing.value_type
                    ),
                });
            }
            return Ok(Arc::clone(existing));
        }

        debug!(metric = %name, ?kind, ?value_type, "Registering metric");
        let metric = Arc::new(Metric {
            name: name.to_string(),
            kind,
            value_type,
        });
        metrics.insert(name.to_string(), Arc::clone(&metric));
        Ok(metric)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Metric>> {
        let metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        metrics.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_METRIC_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(Error::MetricRegistration {
            message: format!("invalid metric name '{}'", name),
        })
    }
}
