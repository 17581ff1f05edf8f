//! Configuration types for nacos-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Registry connection configuration.
    pub registry: RegistryConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// TTL for DNS records in seconds.
    #[serde(default = "default_record_ttl")]
    pub ttl: u32,

    /// How cached instance sets become answers.
    #[serde(default)]
    pub answer_mode: AnswerMode,
}

/// How a cached instance set is turned into a DNS answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerMode {
    /// All eligible instances, each replicated `ceil(weight)` times.
    #[default]
    Weighted,
    /// Exactly one instance per answer, rotating through the eligible set.
    RoundRobin,
}

/// Registry connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry server to connect to (`host:port`).
    pub server_addr: SocketAddr,

    /// Registry namespace; empty means the default namespace.
    #[serde(default)]
    pub namespace: String,

    /// Seconds between full service-list refreshes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Page size for the service-list operation.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout for registry round trips, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// UDP address to receive registry push notifications on.
    /// Push synchronization is disabled when unset.
    #[serde(default)]
    pub push_listen_addr: Option<SocketAddr>,

    /// Directory of serialized service snapshots to import at startup.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl RegistryConfig {
    /// The full-resync interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "nacos_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_record_ttl() -> u32 {
    60
}

fn default_poll_interval() -> u64 {
    20
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout() -> u64 {
    5
}
