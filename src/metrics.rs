//! Metrics instrumentation for nacos-dns.
//!
//! All metrics are prefixed with `nacos_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::Empty => "empty",
        QueryResult::Delegated => "delegated",
        QueryResult::Error => "error",
    };

    counter!("nacos_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("nacos_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned at least one record.
    Success,
    /// Name is ours but no eligible instance matched.
    Empty,
    /// Name is not ours; handed to the next resolver in the chain.
    Delegated,
    /// Query failed with an error.
    Error,
}

/// Record a registry fetch.
pub fn record_fetch(outcome: FetchOutcome) {
    let outcome_str = match outcome {
        FetchOutcome::Ok => "ok",
        FetchOutcome::EmptyResult => "empty",
        FetchOutcome::Failed => "failed",
    };

    counter!("nacos_dns.fetch.count", "outcome" => outcome_str).increment(1);
}

/// Outcome of a registry fetch.
#[derive(Debug, Clone, Copy)]
pub enum FetchOutcome {
    /// Instances returned.
    Ok,
    /// Registry answered with zero instances.
    EmptyResult,
    /// Round trip failed; an empty snapshot was cached instead.
    Failed,
}

/// Record a push-channel event.
pub fn record_push_event(kind: PushEventKind) {
    let kind_str = match kind {
        PushEventKind::Merge => "merge",
        PushEventKind::Refresh => "refresh",
        PushEventKind::Withdraw => "withdraw",
        PushEventKind::Malformed => "malformed",
    };

    counter!("nacos_dns.push.event.count", "kind" => kind_str).increment(1);
}

/// Push event kinds.
#[derive(Debug, Clone, Copy)]
pub enum PushEventKind {
    /// Delta merged into an existing cache entry.
    Merge,
    /// Delta for an uncached name; a full fetch repopulated it.
    Refresh,
    /// A name was confirmed empty and unsubscribed.
    Withdraw,
    /// Payload could not be parsed and was discarded.
    Malformed,
}

/// Record a subscription action against the registry.
pub fn record_subscription(action: SubscriptionAction) {
    let action_str = match action {
        SubscriptionAction::Subscribe => "subscribe",
        SubscriptionAction::Unsubscribe => "unsubscribe",
        SubscriptionAction::Failed => "failed",
    };

    counter!("nacos_dns.subscription.count", "action" => action_str).increment(1);
}

/// Subscription lifecycle actions.
#[derive(Debug, Clone, Copy)]
pub enum SubscriptionAction {
    /// A subscribe call succeeded.
    Subscribe,
    /// An unsubscribe call succeeded.
    Unsubscribe,
    /// A subscribe or unsubscribe call failed.
    Failed,
}

/// Record a completed membership refresh.
pub fn record_membership_refresh(names: usize) {
    counter!("nacos_dns.membership.refresh.count").increment(1);
    gauge!("nacos_dns.membership.names").set(names as f64);
}

/// Record state counts (call periodically or on change).
pub fn record_state_counts(cached: usize, known: usize, subscribed: usize) {
    gauge!("nacos_dns.state.cache.entries").set(cached as f64);
    gauge!("nacos_dns.state.membership.names").set(known as f64);
    gauge!("nacos_dns.state.subscriptions").set(subscribed as f64);
}

/// Record instances returned for a successful resolve.
pub fn record_instances_returned(count: usize) {
    histogram!("nacos_dns.query.instances_returned").record(count as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
