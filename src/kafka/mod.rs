pub mod client;
pub mod producer;

#[cfg(test)]
mod tests;

pub use client::{KafkaClient, KafkaConnector};
pub use producer::KafkaProducer;

/// Strips an optional `kafka://` scheme so the URL can be used as
/// `bootstrap.servers`.
pub(crate) fn bootstrap_servers(url: &str) -> String {
    url.strip_prefix("kafka://")
        .unwrap_or(url)
        .split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
