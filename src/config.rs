use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_BATCHING_MAX_MESSAGES: u32 = 100;
pub const DEFAULT_MAX_PENDING_MESSAGES: i32 = 100;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Sparse client configuration as supplied by a script or config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientConfig {
    pub url: String,
    #[serde(default, with = "humantime_serde")]
    pub connection_timeout: Option<Duration>,
}

/// Sparse producer configuration. Zero or unset fields fall back to defaults
/// when resolved.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProducerConfig {
    pub topic: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub compression: CompressionType,
    #[serde(default)]
    pub batching_max_messages: u32,
    #[serde(default)]
    pub max_pending_messages: i32,
    #[serde(default, with = "humantime_serde")]
    pub send_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zlib,
    Zstd,
}

impl CompressionType {
    /// Codec name understood by librdkafka's `compression.type`.
    pub fn kafka_codec(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            // librdkafka has no raw zlib codec; gzip is the same deflate stream
            CompressionType::Gzip | CompressionType::Zlib => "gzip",
            CompressionType::Snappy => "snappy",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

/// Fully resolved client options handed to a [`crate::client::BrokerConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub url: String,
    pub connection_timeout: Duration,
}

/// Fully resolved producer options. Frozen for the producer's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerOptions {
    pub topic: String,
    pub name: Option<String>,
    pub compression: CompressionType,
    pub batching_max_messages: u32,
    pub max_pending_messages: i32,
    pub send_timeout: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout: None,
        }
    }

    pub fn resolve(&self) -> ClientOptions {
        ClientOptions {
            url: self.url.clone(),
            connection_timeout: non_zero_or(self.connection_timeout, DEFAULT_CONNECTION_TIMEOUT),
        }
    }
}

impl ProducerConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn resolve(&self) -> ProducerOptions {
        let batching_max_messages = if self.batching_max_messages > 0 {
            self.batching_max_messages
        } else {
            DEFAULT_BATCHING_MAX_MESSAGES
        };
        let max_pending_messages = if self.max_pending_messages > 0 {
            self.max_pending_messages
        } else {
            DEFAULT_MAX_PENDING_MESSAGES
        };

        ProducerOptions {
            topic: self.topic.clone(),
            name: self.name.clone(),
            compression: self.compression,
            batching_max_messages,
            max_pending_messages,
            send_timeout: non_zero_or(self.send_timeout, DEFAULT_SEND_TIMEOUT),
        }
    }
}

fn non_zero_or(value: Option<Duration>, default: Duration) -> Duration {
    match value {
        Some(d) if !d.is_zero() => d,
        _ => default,
    }
}

/// Configuration for the `pubsub-load` driver binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadConfig {
    pub client: ClientConfig,
    pub producer: ProducerConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_vus")]
    pub vus: usize,
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    #[serde(default)]
    pub async_send: bool,
    #[serde(default)]
    pub properties: std::collections::HashMap<String, String>,
    /// Upper bound on the whole run; outstanding samples are dropped after it.
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            vus: default_vus(),
            iterations: default_iterations(),
            payload_size: default_payload_size(),
            async_send: false,
            properties: Default::default(),
            duration: None,
        }
    }
}

impl LoadConfig {
    /// Loads a run file, letting `PUBSUB_LOAD_*` variables override it
    /// (`PUBSUB_LOAD_PRODUCER__TOPIC=orders`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("PUBSUB_LOAD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

fn default_vus() -> usize {
    1
}

fn default_iterations() -> u64 {
    100
}

fn default_payload_size() -> usize {
    64
}
