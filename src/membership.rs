//! Registry membership and subscription bookkeeping.
//!
//! Two independent reader/writer-locked sets. They deliberately do not
//! share a lock: the query path reads membership while the push path
//! flips subscriptions, and keeping the locks separate means no code path
//! ever holds both.

use parking_lot::RwLock;
use std::collections::HashSet;

/// The set of service names the registry currently reports as existing.
///
/// Answers the "is this name ours" question on every DNS query without a
/// registry round trip. Rebuilt additively by the background full-resync
/// loop; names are only removed through explicit [`mark`](Self::mark)
/// calls (e.g. a push callback confirming a withdrawal).
#[derive(Debug, Default)]
pub struct RegistryMembership {
    names: RwLock<HashSet<String>>,
}

impl RegistryMembership {
    /// Create an empty membership set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the registry reported `name` on a previous listing.
    pub fn is_known(&self, name: &str) -> bool {
        self.names.read().contains(name)
    }

    /// Merge a full service-name listing into the set.
    ///
    /// Additive: names absent from `names` are kept. The background loop
    /// never removes entries, removal is an explicit `mark(name, false)`.
    pub fn refresh_all(&self, names: Vec<String>) {
        let mut guard = self.names.write();
        guard.extend(names);
    }

    /// Point update for a single name.
    pub fn mark(&self, name: &str, known: bool) {
        let mut guard = self.names.write();
        if known {
            guard.insert(name.to_string());
        } else {
            guard.remove(name);
        }
    }

    /// Copy of all known names, for iteration without holding the lock.
    pub fn names(&self) -> Vec<String> {
        self.names.read().iter().cloned().collect()
    }

    /// Number of known names.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Whether no names are known yet.
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

/// Tracks which service names currently have an active push subscription.
///
/// Gates calls into the registry client so each name has at most one
/// logical subscription outstanding. Double subscribing is wasted work
/// against the registry rather than a correctness bug, but it is still
/// avoided here.
#[derive(Debug, Default)]
pub struct SubscriptionLedger {
    subscribed: RwLock<HashSet<String>>,
}

impl SubscriptionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` currently has an active subscription.
    pub fn has_subscribed(&self, name: &str) -> bool {
        self.subscribed.read().contains(name)
    }

    /// Record the subscription state for `name`.
    pub fn set_subscribed(&self, name: &str, subscribed: bool) {
        let mut guard = self.subscribed.write();
        if subscribed {
            guard.insert(name.to_string());
        } else {
            guard.remove(name);
        }
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.subscribed.read().len()
    }

    /// Whether no subscriptions are active.
    pub fn is_empty(&self) -> bool {
        self.subscribed.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_all_makes_names_known() {
        let membership = RegistryMembership::new();
        assert!(!membership.is_known("orders"));

        membership.refresh_all(vec!["orders".to_string(), "billing".to_string()]);

        assert!(membership.is_known("orders"));
        assert!(membership.is_known("billing"));
        assert_eq!(membership.len(), 2);
    }

    #[test]
    fn test_refresh_all_is_additive() {
        let membership = RegistryMembership::new();
        membership.refresh_all(vec!["orders".to_string()]);
        membership.refresh_all(vec!["billing".to_string()]);

        // An empty or partial listing never drops previously known names.
        membership.refresh_all(Vec::new());
        assert!(membership.is_known("orders"));
        assert!(membership.is_known("billing"));
    }

    #[test]
    fn test_mark_removes_and_restores() {
        let membership = RegistryMembership::new();
        membership.refresh_all(vec!["orders".to_string()]);

        membership.mark("orders", false);
        assert!(!membership.is_known("orders"));

        membership.mark("orders", true);
        assert!(membership.is_known("orders"));
    }

    #[test]
    fn test_ledger_gating() {
        let ledger = SubscriptionLedger::new();
        assert!(!ledger.has_subscribed("orders"));

        ledger.set_subscribed("orders", true);
        assert!(ledger.has_subscribed("orders"));
        assert_eq!(ledger.len(), 1);

        // Idempotent.
        ledger.set_subscribed("orders", true);
        assert_eq!(ledger.len(), 1);

        ledger.set_subscribed("orders", false);
        assert!(!ledger.has_subscribed("orders"));
        assert!(ledger.is_empty());
    }
}
