//! Error types for nacos-dns.

use thiserror::Error;

/// Errors that can occur in the DNS server.
///
/// None of these are fatal on the query path: a failed registry round trip
/// degrades to an empty or stale answer for one name.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry unreachable (HTTP transport failure or timeout)
    #[error("registry request failed: {0}")]
    Registry(#[from] reqwest::Error),

    /// Unparseable payload from the registry
    #[error("malformed registry payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid name with no instances behind it
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}
