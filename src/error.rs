//! Error types and result handling for pubsub-load.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use pubsub_load::{Error, Result};
//!
//! fn publish_without_a_run() -> Result<()> {
//!     Err(Error::NoActiveState)
//! }
//!
//! match publish_without_a_run() {
//!     Ok(()) => println!("Published"),
//!     Err(Error::NoActiveState) => eprintln!("Called outside of an active run"),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// Boxed error returned across the messaging client boundary.
///
/// Client implementations report their own error types through this alias;
/// the connection factory and publish engine wrap or forward them.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for pubsub-load operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file or environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configuration value was rejected before reaching the client.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what was invalid
        message: String,
    },

    /// The broker connection could not be opened.
    #[error("Connection error: {source}")]
    Connection {
        /// Cause reported by the messaging client
        #[source]
        source: BoxError,
    },

    /// The producer could not be created for the given topic.
    #[error("Producer creation error for topic '{topic}': {source}")]
    ProducerCreation {
        /// Topic the producer was requested for
        topic: String,
        /// Cause reported by the messaging client
        #[source]
        source: BoxError,
    },

    /// A send failed. The client error is forwarded unchanged.
    #[error("{0}")]
    Send(#[source] BoxError),

    /// The run context was canceled while a synchronous send was in flight.
    #[error("Publish canceled before the broker acknowledged the message")]
    Canceled,

    /// Called without an active run state (e.g. from the init phase or after
    /// the virtual user has finished).
    #[error("No active run state: publish and reporting require a running iteration")]
    NoActiveState,

    /// A metric could not be registered with the host registry.
    #[error("Metric registration error: {message}")]
    MetricRegistration {
        /// Description of the rejected metric
        message: String,
    },

    /// Kafka client error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when writing run summaries.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

/// A convenient Result type alias for pubsub-load operations.
///
/// This is equivalent to `std::result::Result<T, pubsub_load::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
