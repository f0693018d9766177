pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod metrics;
mod publish;
pub mod pubsub;

pub mod kafka;
pub mod memory;

pub use client::{Connection, Producer};
pub use config::{ClientConfig, CompressionType, LoadConfig, ProducerConfig};
pub use error::{Error, Result};
pub use pubsub::PubSub;
