//! Sharded, lock-striped concurrent map.
//!
//! The service cache and the round-robin index sit on the DNS query path,
//! where any number of queries read concurrently while background refresh
//! tasks write. Striping the map over independently locked shards keeps
//! query-path reads from serializing against refresh writes.

use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Default shard count. Power of two so the modulo is a mask.
const DEFAULT_SHARDS: usize = 32;

/// A concurrent map striped over independently locked shards.
///
/// All operations are safe for unbounded concurrent callers. Values are
/// returned by clone; `entries()` returns a point-in-time copy that can be
/// iterated while other callers keep mutating the map.
#[derive(Debug)]
pub struct ShardedMap<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K, V> Default for ShardedMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a map with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create a map with `shards` stripes (rounded up to at least one).
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Get a clone of the value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Insert or replace the value for `key`.
    pub fn insert(&self, key: K, value: V) {
        self.shard(&key).write().insert(key, value);
    }

    /// Remove `key`, returning the previous value if any.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    /// Total number of entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Point-in-time copy of all entries.
    ///
    /// Each shard is locked and copied in turn, so the result is consistent
    /// per shard but not across shards. Safe to iterate while concurrent
    /// mutation proceeds elsewhere.
    pub fn entries(&self) -> Vec<(K, V)> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read();
            out.extend(guard.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}
