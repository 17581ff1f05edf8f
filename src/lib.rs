//! nacos-dns - A DNS server bridging name resolution to a service registry.
//!
//! This crate answers DNS queries for service names with the live set of
//! healthy instances of that service, sourced from a Nacos-style service
//! registry. The registry is synced two ways: a periodic full listing
//! (pull) and per-service push notifications (UDP), with an on-demand
//! fetch whenever a query misses the cache.
//!
//! ## Features
//!
//! - Concurrent in-memory service-instance cache, never blocking a query
//!   on a registry round trip when any (even stale) snapshot exists
//! - Push-driven invalidation with subscribe/unsubscribe lifecycle
//! - Weighted and round-robin instance selection
//! - Per-query ownership decision: unmanaged names are refused so a
//!   chained resolver can take over
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          nacos-dns                              │
//! │                                                                 │
//! │  ┌──────────────────┐       ┌──────────────────┐               │
//! │  │ Registry Client  │──────▶│  Service Cache   │               │
//! │  │ (HTTP + UDP push)│       │  + Membership    │               │
//! │  └──────────────────┘       └────────┬─────────┘               │
//! │         ▲                            │                          │
//! │         │ list (20s)                 ▼                          │
//! │         │ get on miss          ┌──────────────────┐            │
//! │         │ staleness sweep (1s) │  Hickory DNS     │◀── UDP/TCP │
//! │         │ subscribe/push       │  Server          │    :53     │
//! │         └──────────────────────└──────────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Resolution
//!
//! ```text
//! orders.default.svc
//!   → is the name in registry membership (or already cached)?
//!   → cached instance set (fetched on miss, refreshed in background)
//!   → filter healthy ∧ enabled ∧ weight > 0, expand or rotate
//!   → A/AAAA answer records + _<proto> SRV additionals
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use nacos_dns::{Config, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: Config = load_config();
//!
//!     let shutdown = CancellationToken::new();
//!     let server = DnsServer::new(config);
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod answer;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod membership;
pub mod metrics;
pub mod push;
pub mod registry;
pub mod server;
pub mod shard_map;
pub mod sync;
pub mod telemetry;

// Re-export main types
pub use config::{AnswerMode, Config, DnsConfig, RegistryConfig, TelemetryConfig};
pub use error::DnsError;
pub use handler::DnsHandler;
pub use server::DnsServer;
pub use sync::{EngineOptions, SyncEngine};
