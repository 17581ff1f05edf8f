//! Synchronization engine between the registry and the local cache.
//!
//! Three refresh paths keep the cache eventually consistent with the
//! registry: a 20-second full listing that feeds [`RegistryMembership`], an
//! on-demand fetch when a query misses the cache, and the push channel
//! merging instance deltas as the registry delivers them. A once-per-second
//! staleness sweep backstops the push channel with pull-based refresh.
//!
//! Locks are only ever taken around the in-memory read/modify/write step;
//! names are copied out of membership and the cache before any registry
//! round trip, so no lock is held across an await.

use futures::future::join_all;
use hickory_proto::rr::{Name, Record, RecordType};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::answer;
use crate::cache::{cache_key, plain_service_name, split_cache_key, ServiceCache, ServiceSnapshot};
use crate::config::{AnswerMode, Config};
use crate::error::DnsError;
use crate::membership::{RegistryMembership, SubscriptionLedger};
use crate::metrics::{self, FetchOutcome, PushEventKind, SubscriptionAction};
use crate::registry::{PushUpdate, RegistryClient};
use crate::shard_map::ShardedMap;

/// Interval of the per-entry staleness sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for the engine, lifted out of [`Config`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How cached instance sets become answers.
    pub answer_mode: AnswerMode,
    /// TTL stamped on rendered DNS records, in seconds.
    pub record_ttl: u32,
    /// Snapshot TTL when the registry payload does not carry one.
    pub snapshot_ttl: Duration,
    /// Interval between full service-list refreshes.
    pub poll_interval: Duration,
    /// Page size for the service-list operation.
    pub page_size: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            answer_mode: AnswerMode::Weighted,
            record_ttl: 60,
            snapshot_ttl: crate::cache::DEFAULT_SNAPSHOT_TTL,
            poll_interval: Duration::from_secs(20),
            page_size: 100,
        }
    }
}

impl EngineOptions {
    /// Derive engine options from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            answer_mode: config.dns.answer_mode,
            record_ttl: config.dns.ttl,
            snapshot_ttl: crate::cache::DEFAULT_SNAPSHOT_TTL,
            poll_interval: config.registry.poll_interval(),
            page_size: config.registry.page_size,
        }
    }
}

/// Orchestrates cache, membership, and subscriptions against the registry.
///
/// The engine is the sole owner of the registry client: every
/// list/get/subscribe/unsubscribe call in the process goes through here.
pub struct SyncEngine {
    registry: Arc<dyn RegistryClient>,
    cache: ServiceCache,
    membership: RegistryMembership,
    subscriptions: SubscriptionLedger,
    rr_index: ShardedMap<String, usize>,
    options: EngineOptions,
}

impl SyncEngine {
    /// Create an engine over the given registry client.
    pub fn new(registry: Arc<dyn RegistryClient>, options: EngineOptions) -> Self {
        Self {
            registry,
            cache: ServiceCache::new(options.snapshot_ttl),
            membership: RegistryMembership::new(),
            subscriptions: SubscriptionLedger::new(),
            rr_index: ShardedMap::new(),
            options,
        }
    }

    /// The service cache.
    pub fn cache(&self) -> &ServiceCache {
        &self.cache
    }

    /// The registry membership set.
    pub fn membership(&self) -> &RegistryMembership {
        &self.membership
    }

    /// The subscription ledger.
    pub fn subscriptions(&self) -> &SubscriptionLedger {
        &self.subscriptions
    }

    /// Decide whether `service` is ours to answer.
    ///
    /// A name is ours when the registry listed it or when a snapshot for it
    /// is already cached (e.g. warm-imported before the first listing
    /// completed). For a listed name this also performs the query-path side
    /// effects: fetch-on-miss and subscription ensure.
    pub async fn owns_name(&self, service: &str, client_ip: IpAddr) -> bool {
        let known = self.membership.is_known(service);
        let cached = self.cache.contains(service);

        if known {
            if !cached {
                self.fetch_now(service, Some(client_ip)).await;
            }
            self.ensure_subscribed(service).await;
        }

        known || cached
    }

    /// Fetch `service` from the registry right now and cache the result.
    ///
    /// The snapshot lands under the plain service key and, when a requester
    /// is given, under the requester-scoped key as well. A failed round
    /// trip caches an empty, always-stale snapshot instead of surfacing an
    /// error: the DNS path always gets *an* answer.
    pub async fn fetch_now(&self, service: &str, client_ip: Option<IpAddr>) -> ServiceSnapshot {
        let snapshot = match self.registry.get_service(service, client_ip).await {
            Ok(info) => {
                if info.hosts.is_empty() {
                    warn!(service, "empty result from registry");
                    metrics::record_fetch(FetchOutcome::EmptyResult);
                } else {
                    debug!(service, count = info.hosts.len(), "service refreshed");
                    metrics::record_fetch(FetchOutcome::Ok);
                }
                ServiceSnapshot::from_info(service, info, self.options.snapshot_ttl)
            }
            Err(err) => {
                warn!(service, %err, "registry fetch failed, caching empty snapshot");
                metrics::record_fetch(FetchOutcome::Failed);
                ServiceSnapshot::failed(service, self.options.snapshot_ttl)
            }
        };

        self.cache.insert(service, snapshot.clone());
        if let Some(ip) = client_ip {
            self.cache.insert(&cache_key(service, ip), snapshot.clone());
        }

        snapshot
    }

    /// Resolve a query into `(address record, SRV record)` pairs.
    ///
    /// Always returns, possibly empty; registry trouble degrades to an
    /// empty or stale answer, never to an error.
    pub async fn resolve(
        &self,
        qname: &Name,
        client_ip: IpAddr,
        qtype: RecordType,
    ) -> Vec<(Record, Record)> {
        let qname_str = qname.to_string();
        let service = qname_str.trim_end_matches('.');
        let ttl = self.options.record_ttl;

        match self.options.answer_mode {
            AnswerMode::Weighted => {
                let snapshot = self.requester_snapshot(service, client_ip).await;
                answer::expand_weighted(&snapshot.instances)
                    .iter()
                    .filter_map(|host| answer::instance_records(qname, qtype, ttl, host))
                    .collect()
            }
            AnswerMode::RoundRobin => {
                let snapshot = self.shared_snapshot(service, client_ip).await;
                answer::round_robin_pick(service, &snapshot.instances, &self.rr_index)
                    .and_then(|host| answer::instance_records(qname, qtype, ttl, host))
                    .into_iter()
                    .collect()
            }
        }
    }

    /// Round-robin pick of a single instance for `service`.
    pub async fn select_one(
        &self,
        service: &str,
        client_ip: IpAddr,
    ) -> Option<crate::registry::Instance> {
        let snapshot = self.shared_snapshot(service, client_ip).await;
        answer::round_robin_pick(service, &snapshot.instances, &self.rr_index).cloned()
    }

    /// Snapshot under the requester-scoped key, fetching on miss.
    async fn requester_snapshot(&self, service: &str, client_ip: IpAddr) -> ServiceSnapshot {
        let key = cache_key(service, client_ip);
        match self.cache.lookup(&key) {
            Some(snapshot) => snapshot,
            None => self.fetch_now(service, Some(client_ip)).await,
        }
    }

    /// Snapshot under the plain service key, fetching on miss.
    async fn shared_snapshot(&self, service: &str, client_ip: IpAddr) -> ServiceSnapshot {
        match self.cache.lookup(service) {
            Some(snapshot) => snapshot,
            None => self.fetch_now(service, Some(client_ip)).await,
        }
    }

    /// Subscribe to `service` unless a subscription is already active.
    async fn ensure_subscribed(&self, service: &str) {
        if self.subscriptions.has_subscribed(service) {
            return;
        }
        match self.registry.subscribe(service).await {
            Ok(()) => {
                debug!(service, "subscribed");
                self.subscriptions.set_subscribed(service, true);
                metrics::record_subscription(SubscriptionAction::Subscribe);
            }
            Err(err) => {
                warn!(service, %err, "subscribe failed");
                metrics::record_subscription(SubscriptionAction::Failed);
            }
        }
    }

    /// Drop the subscription for `service` if one is active.
    async fn unsubscribe_now(&self, service: &str) {
        if !self.subscriptions.has_subscribed(service) {
            return;
        }
        match self.registry.unsubscribe(service).await {
            Ok(()) => {
                debug!(service, "unsubscribed");
                self.subscriptions.set_subscribed(service, false);
                metrics::record_subscription(SubscriptionAction::Unsubscribe);
            }
            Err(err) => {
                warn!(service, %err, "unsubscribe failed");
                metrics::record_subscription(SubscriptionAction::Failed);
            }
        }
    }

    /// Apply one push-delivered instance update.
    ///
    /// An empty delivery does not say which name went dark, so every
    /// membership-known name is confirmed with a fresh registry call;
    /// names confirmed empty get a zero-instance snapshot (so lookups keep
    /// answering without a fetch storm) and their subscription is dropped.
    pub async fn handle_push(&self, update: PushUpdate) {
        if update.instances.is_empty() {
            let checks = self.membership.names().into_iter().map(|service| async move {
                match self.registry.get_service(&service, None).await {
                    Ok(info) if info.hosts.is_empty() => {
                        info!(%service, "service withdrawn, clearing instances");
                        self.cache.insert(
                            &service,
                            ServiceSnapshot::fresh(&service, Vec::new(), self.options.snapshot_ttl),
                        );
                        self.unsubscribe_now(&service).await;
                        metrics::record_push_event(PushEventKind::Withdraw);
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%service, %err, "withdrawal check failed"),
                }
            });
            join_all(checks).await;
            return;
        }

        let service = plain_service_name(&update.instances[0].service_name).to_string();
        if service.is_empty() {
            warn!("push update with unnamed instances, discarding");
            metrics::record_push_event(PushEventKind::Malformed);
            return;
        }

        if self.cache.contains(&service) {
            self.cache.merge(&service, update.instances);
            metrics::record_push_event(PushEventKind::Merge);
        } else {
            debug!(service = %service, "pushed service not cached, fetching");
            self.fetch_now(&service, None).await;
            metrics::record_push_event(PushEventKind::Refresh);
        }
        self.membership.mark(&service, true);
    }

    /// Page through the registry's full service listing and merge it into
    /// membership. Returns the number of names the registry reported.
    pub async fn refresh_membership(&self) -> Result<usize, DnsError> {
        let mut names = Vec::new();
        let mut page_no = 1u32;
        loop {
            let page = self
                .registry
                .service_names(page_no, self.options.page_size)
                .await?;
            let short_page = (page.len() as u32) < self.options.page_size;
            names.extend(page);
            if short_page {
                break;
            }
            page_no += 1;
        }

        let count = names.len();
        self.membership.refresh_all(names);
        metrics::record_membership_refresh(self.membership.len());
        Ok(count)
    }

    /// One staleness-sweep pass: refetch every stale entry whose service is
    /// still membership-known, storing back under the examined key.
    pub async fn sweep_stale(&self) {
        for (key, snapshot) in self.cache.entries() {
            if !snapshot.is_stale() {
                continue;
            }
            let (service, client_ip) = split_cache_key(&key);
            if !self.membership.is_known(service) {
                continue;
            }
            self.fetch_now(service, client_ip).await;
        }
    }

    /// Background full-resync loop. Runs until cancelled; a failed listing
    /// is logged and skipped, never fatal.
    pub async fn run_membership_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.options.poll_interval);
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("membership loop shutting down");
                    return;
                }

                _ = interval.tick() => {
                    match self.refresh_membership().await {
                        Ok(count) => debug!(count, "refreshed service listing"),
                        Err(err) => warn!(%err, "service listing failed, keeping previous membership"),
                    }
                }
            }
        }
    }

    /// Background staleness sweep. Pull-based correctness backstop for the
    /// push channel; O(cache size) per pass, bounded by registry size.
    pub async fn run_staleness_sweep(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("staleness sweep shutting down");
                    return;
                }

                _ = interval.tick() => {
                    self.sweep_stale().await;
                }
            }
        }
    }

    /// Drain the push channel until it closes or shutdown is requested.
    pub async fn run_push_loop(
        self: Arc<Self>,
        mut updates: mpsc::Receiver<PushUpdate>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("push loop shutting down");
                    return;
                }

                update = updates.recv() => {
                    match update {
                        Some(update) => self.handle_push(update).await,
                        None => {
                            info!("push channel closed");
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Instance, ServiceInfo};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockRegistry {
        services: Mutex<HashMap<String, ServiceInfo>>,
        listing: Mutex<Vec<String>>,
        fail_gets: AtomicBool,
        get_calls: AtomicUsize,
        page_calls: AtomicUsize,
        subscribe_calls: AtomicUsize,
        unsubscribe_calls: AtomicUsize,
    }

    impl MockRegistry {
        fn set_service(&self, name: &str, instances: Vec<Instance>) {
            self.services.lock().insert(
                name.to_string(),
                ServiceInfo {
                    name: name.to_string(),
                    cache_millis: 0,
                    hosts: instances,
                    last_ref_time: 1,
                },
            );
        }
    }

    #[async_trait]
    impl RegistryClient for MockRegistry {
        async fn service_names(
            &self,
            page_no: u32,
            page_size: u32,
        ) -> Result<Vec<String>, DnsError> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            let listing = self.listing.lock();
            let start = ((page_no - 1) * page_size) as usize;
            let end = (start + page_size as usize).min(listing.len());
            Ok(listing.get(start..end).unwrap_or(&[]).to_vec())
        }

        async fn get_service(
            &self,
            service: &str,
            _client_ip: Option<IpAddr>,
        ) -> Result<ServiceInfo, DnsError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_gets.load(Ordering::SeqCst) {
                return Err(DnsError::ServiceNotFound(service.to_string()));
            }
            Ok(self.services.lock().get(service).cloned().unwrap_or_default())
        }

        async fn subscribe(&self, _service: &str) -> Result<(), DnsError> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unsubscribe(&self, _service: &str) -> Result<(), DnsError> {
            self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn make_instance(ip: &str, service: &str) -> Instance {
        Instance {
            ip: ip.parse().unwrap(),
            port: 8080,
            weight: 1.0,
            healthy: true,
            enabled: true,
            metadata: HashMap::new(),
            service_name: service.to_string(),
        }
    }

    fn make_engine(registry: Arc<MockRegistry>) -> SyncEngine {
        SyncEngine::new(registry, EngineOptions::default())
    }

    fn client_ip() -> IpAddr {
        "10.9.9.9".parse().unwrap()
    }

    #[tokio::test]
    async fn test_owns_name_fetches_on_miss_once() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service("orders", vec![make_instance("10.0.0.1", "orders")]);
        let engine = make_engine(Arc::clone(&registry));
        engine.membership.refresh_all(vec!["orders".to_string()]);

        assert!(engine.owns_name("orders", client_ip()).await);
        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);

        // Cached now: no further fetch.
        assert!(engine.owns_name("orders", client_ip()).await);
        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_uncached_name_is_not_ours() {
        let registry = Arc::new(MockRegistry::default());
        let engine = make_engine(Arc::clone(&registry));

        assert!(!engine.owns_name("stranger", client_ip()).await);
        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.subscribe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscribe_happens_once() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service("orders", vec![make_instance("10.0.0.1", "orders")]);
        let engine = make_engine(Arc::clone(&registry));
        engine.membership.refresh_all(vec!["orders".to_string()]);

        engine.owns_name("orders", client_ip()).await;
        engine.owns_name("orders", client_ip()).await;
        engine.owns_name("orders", client_ip()).await;

        assert_eq!(registry.subscribe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_miss_then_hit() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service("orders", vec![make_instance("10.0.0.1", "orders")]);
        let engine = make_engine(Arc::clone(&registry));
        engine.membership.refresh_all(vec!["orders".to_string()]);

        let qname = Name::from_ascii("orders.").unwrap();
        let pairs = engine.resolve(&qname, client_ip(), RecordType::A).await;
        assert_eq!(pairs.len(), 1);
        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);

        // Second resolve for the same key: zero additional registry calls.
        let pairs = engine.resolve(&qname, client_ip(), RecordType::A).await;
        assert_eq!(pairs.len(), 1);
        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_caches_empty_stale_snapshot() {
        let registry = Arc::new(MockRegistry::default());
        registry.fail_gets.store(true, Ordering::SeqCst);
        let engine = make_engine(Arc::clone(&registry));

        let snapshot = engine.fetch_now("orders", Some(client_ip())).await;
        assert!(snapshot.instances.is_empty());
        assert!(snapshot.is_stale());
        assert!(engine.cache.contains("orders"));
        assert!(engine.cache.contains(&cache_key("orders", client_ip())));
    }

    #[tokio::test]
    async fn test_push_merge_updates_cached_entry() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service("orders", vec![make_instance("10.0.0.1", "orders")]);
        let engine = make_engine(Arc::clone(&registry));
        engine.membership.refresh_all(vec!["orders".to_string()]);
        engine.owns_name("orders", client_ip()).await;

        engine
            .handle_push(PushUpdate {
                instances: vec![
                    make_instance("10.0.0.2", "DEFAULT_GROUP@@orders"),
                    make_instance("10.0.0.3", "DEFAULT_GROUP@@orders"),
                ],
            })
            .await;

        let snapshot = engine.cache.lookup("orders").unwrap();
        assert_eq!(snapshot.instances.len(), 2);
        // Merge happened in memory, not through another fetch.
        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_push_for_uncached_service_fetches() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service("billing", vec![make_instance("10.0.0.5", "billing")]);
        let engine = make_engine(Arc::clone(&registry));

        engine
            .handle_push(PushUpdate {
                instances: vec![make_instance("10.0.0.5", "DEFAULT_GROUP@@billing")],
            })
            .await;

        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);
        assert!(engine.cache.contains("billing"));
        // A pushed name is known to exist even before the next listing.
        assert!(engine.membership.is_known("billing"));
    }

    #[tokio::test]
    async fn test_withdrawal_unsubscribes_and_keeps_empty_snapshot() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service("orders", vec![make_instance("10.0.0.1", "orders")]);
        let engine = make_engine(Arc::clone(&registry));
        engine.membership.refresh_all(vec!["orders".to_string()]);
        engine.owns_name("orders", client_ip()).await;
        assert!(engine.subscriptions.has_subscribed("orders"));

        // Registry now reports the service empty; the push channel delivers
        // a zero-instance update that does not name the service.
        registry.set_service("orders", Vec::new());
        engine.handle_push(PushUpdate { instances: Vec::new() }).await;

        assert!(!engine.subscriptions.has_subscribed("orders"));
        assert_eq!(registry.unsubscribe_calls.load(Ordering::SeqCst), 1);
        let snapshot = engine.cache.lookup("orders").unwrap();
        assert!(snapshot.instances.is_empty());
        // Fresh zero-instance snapshot: lookups keep answering without
        // re-triggering a fetch storm.
        assert!(!snapshot.is_stale());

        // A later query still gets an answer (empty) without error.
        let qname = Name::from_ascii("orders.").unwrap();
        let pairs = engine.resolve(&qname, client_ip(), RecordType::A).await;
        assert!(pairs.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_membership_pages_until_short_page() {
        let registry = Arc::new(MockRegistry::default());
        {
            let mut listing = registry.listing.lock();
            *listing = (0..250).map(|i| format!("svc-{i}")).collect();
        }
        let engine = SyncEngine::new(
            Arc::clone(&registry) as Arc<dyn RegistryClient>,
            EngineOptions {
                page_size: 100,
                ..EngineOptions::default()
            },
        );

        let count = engine.refresh_membership().await.unwrap();
        assert_eq!(count, 250);
        assert_eq!(engine.membership.len(), 250);
        // Two full pages plus the short page that stops the loop.
        assert_eq!(registry.page_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sweep_refreshes_stale_known_entries_only() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service("orders", vec![make_instance("10.0.0.1", "orders")]);
        let engine = make_engine(Arc::clone(&registry));
        engine.membership.refresh_all(vec!["orders".to_string()]);

        // Stale entry for a known name, stale entry for a forgotten name.
        engine
            .cache
            .insert("orders", ServiceSnapshot::failed("orders", Duration::from_secs(10)));
        engine
            .cache
            .insert("ghost", ServiceSnapshot::failed("ghost", Duration::from_secs(10)));

        engine.sweep_stale().await;

        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);
        assert!(!engine.cache.lookup("orders").unwrap().is_stale());
        assert!(engine.cache.lookup("ghost").unwrap().is_stale());
    }

    #[tokio::test]
    async fn test_select_one_round_robin() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service(
            "orders",
            vec![
                make_instance("10.0.0.1", "orders"),
                make_instance("10.0.0.2", "orders"),
            ],
        );
        let engine = make_engine(Arc::clone(&registry));

        let first = engine.select_one("orders", client_ip()).await.unwrap();
        let second = engine.select_one("orders", client_ip()).await.unwrap();
        assert_ne!(first.ip, second.ip);
        assert_eq!(registry.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_converge() {
        let registry = Arc::new(MockRegistry::default());
        registry.set_service(
            "orders",
            vec![
                make_instance("10.0.0.1", "orders"),
                make_instance("10.0.0.2", "orders"),
            ],
        );
        let engine = Arc::new(make_engine(Arc::clone(&registry)));
        engine.membership.refresh_all(vec!["orders".to_string()]);

        let qname = Name::from_ascii("orders.").unwrap();
        let mut tasks = Vec::new();
        for i in 0..32u8 {
            let engine = Arc::clone(&engine);
            let qname = qname.clone();
            tasks.push(tokio::spawn(async move {
                let ip: IpAddr = format!("10.1.0.{i}").parse().unwrap();
                engine.resolve(&qname, ip, RecordType::A).await
            }));
        }

        for task in tasks {
            let pairs = task.await.unwrap();
            // Every caller sees a complete snapshot: both instances, never
            // a partially merged list.
            assert_eq!(pairs.len(), 2);
        }
    }
}
