//! In-memory service-instance cache.
//!
//! Holds the most recently known instance set per service, keyed either by
//! the plain service name or by service name plus requester address. A
//! stale snapshot is a refresh trigger for the background sweep, never a
//! reason to block a query: whatever is cached gets served.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::DnsError;
use crate::registry::{Instance, ServiceInfo};
use crate::shard_map::ShardedMap;

/// Joins a service name and a requester address into a cache key.
///
/// Reserved: the registry disallows `@@` inside plain service names
/// (group-qualified names are reduced to their final segment before they
/// reach the cache), so composed keys cannot collide with real names.
pub const CACHE_KEY_SEPARATOR: &str = "@@";

/// Snapshot TTL used when the registry payload does not carry one.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(10);

/// Compose the requester-scoped cache key for a service.
pub fn cache_key(service: &str, client_ip: IpAddr) -> String {
    format!("{service}{CACHE_KEY_SEPARATOR}{client_ip}")
}

/// Split a cache key back into service name and optional requester address.
pub fn split_cache_key(key: &str) -> (&str, Option<IpAddr>) {
    match key.split_once(CACHE_KEY_SEPARATOR) {
        Some((service, rest)) => (service, rest.parse().ok()),
        None => (key, None),
    }
}

/// Reduce a possibly group-qualified registry name (`group@@name`) to the
/// plain service name used as a cache key.
pub fn plain_service_name(name: &str) -> &str {
    name.rsplit(CACHE_KEY_SEPARATOR).next().unwrap_or(name)
}

/// The cached state for one cache key.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    /// Plain service name this snapshot belongs to.
    pub name: String,
    /// Last known instance set; order carries no meaning.
    pub instances: Vec<Instance>,
    /// How long this snapshot counts as fresh.
    pub ttl: Duration,
    /// Monotonic refresh time. `None` means the snapshot was imported from
    /// disk or produced by a failed fetch and has never been refreshed in
    /// this process; such snapshots are always stale.
    pub refreshed_at: Option<Instant>,
}

impl ServiceSnapshot {
    /// A snapshot refreshed just now.
    pub fn fresh(name: &str, instances: Vec<Instance>, ttl: Duration) -> Self {
        Self {
            name: name.to_string(),
            instances,
            ttl,
            refreshed_at: Some(Instant::now()),
        }
    }

    /// An empty, always-stale snapshot recording a failed fetch.
    pub fn failed(name: &str, ttl: Duration) -> Self {
        Self {
            name: name.to_string(),
            instances: Vec::new(),
            ttl,
            refreshed_at: None,
        }
    }

    /// Build a snapshot from a registry payload, taking the TTL from the
    /// payload's `cacheMillis` when present and `fallback_ttl` otherwise.
    pub fn from_info(name: &str, info: ServiceInfo, fallback_ttl: Duration) -> Self {
        let ttl = if info.cache_millis > 0 {
            Duration::from_millis(info.cache_millis)
        } else {
            fallback_ttl
        };
        Self::fresh(name, info.hosts, ttl)
    }

    /// Whether the snapshot is past its TTL and eligible for refresh.
    pub fn is_stale(&self) -> bool {
        match self.refreshed_at {
            Some(at) => at.elapsed() > self.ttl,
            None => true,
        }
    }
}

/// Concurrent cache of service snapshots.
#[derive(Debug)]
pub struct ServiceCache {
    entries: ShardedMap<String, ServiceSnapshot>,
    default_ttl: Duration,
}

impl Default for ServiceCache {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TTL)
    }
}

impl ServiceCache {
    /// Create an empty cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: ShardedMap::new(),
            default_ttl,
        }
    }

    /// Pure read of the snapshot stored under `key`.
    pub fn lookup(&self, key: &str) -> Option<ServiceSnapshot> {
        self.entries.get(&key.to_string())
    }

    /// Whether any snapshot is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_string())
    }

    /// Store `snapshot` under `key`, replacing any previous entry.
    pub fn insert(&self, key: &str, snapshot: ServiceSnapshot) {
        self.entries.insert(key.to_string(), snapshot);
    }

    /// Replace the instance set under the plain `service` key and refresh
    /// its timestamp. The only mutation invoked from the push path.
    ///
    /// The entry's TTL is preserved when one exists; a merge for an
    /// uncached service creates the entry with the default TTL.
    pub fn merge(&self, service: &str, instances: Vec<Instance>) {
        let ttl = self
            .lookup(service)
            .map(|snapshot| snapshot.ttl)
            .unwrap_or(self.default_ttl);
        debug!(service, count = instances.len(), "merging pushed instances");
        self.insert(service, ServiceSnapshot::fresh(service, instances, ttl));
    }

    /// Point-in-time copy of all entries, for the staleness sweep.
    pub fn entries(&self) -> Vec<(String, ServiceSnapshot)> {
        self.entries.entries()
    }

    /// Number of cached snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Import a warm-start cache directory: one JSON-serialized service
    /// payload per file, file name = cache key.
    ///
    /// Imported snapshots are marked never-refreshed so the sweep refetches
    /// them as soon as membership confirms the name. Unreadable or
    /// unparseable files are skipped. Returns the number imported.
    pub fn load_warm_dir(&self, dir: &Path) -> Result<usize, DnsError> {
        let mut loaded = 0usize;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().into_owned();
            let raw = match fs::read_to_string(entry.path()) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(file = %entry.path().display(), %err, "failed to read cache file");
                    continue;
                }
            };
            let info: ServiceInfo = match serde_json::from_str(&raw) {
                Ok(info) => info,
                Err(err) => {
                    warn!(file = %entry.path().display(), %err, "skipping unparseable cache file");
                    continue;
                }
            };

            let (service, _) = split_cache_key(&key);
            let snapshot = ServiceSnapshot {
                name: service.to_string(),
                instances: info.hosts,
                ttl: self.default_ttl,
                refreshed_at: None,
            };
            self.insert(&key, snapshot);
            loaded += 1;
        }

        info!(loaded, dir = %dir.display(), "finished loading warm cache");
        Ok(loaded)
    }
}
