//! DNS server setup and lifecycle management.

use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::DnsError;
use crate::handler::DnsHandler;
use crate::push::PushListener;
use crate::registry::NacosApiClient;
use crate::sync::{EngineOptions, SyncEngine};
use crate::metrics;

/// Interval for emitting state metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Buffered push updates between the UDP listener and the engine.
const PUSH_CHANNEL_CAPACITY: usize = 256;

/// Periodically emit state metrics.
async fn metrics_loop(engine: Arc<SyncEngine>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                metrics::record_state_counts(
                    engine.cache().len(),
                    engine.membership().len(),
                    engine.subscriptions().len(),
                );
                debug!(
                    cached = engine.cache().len(),
                    known = engine.membership().len(),
                    subscribed = engine.subscriptions().len(),
                    "emitted state metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// DNS server answering service-name queries from a registry-backed cache.
pub struct DnsServer {
    config: Config,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The server's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the DNS server until the shutdown token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.dns.listen_addr,
            registry_addr = %self.config.registry.server_addr,
            answer_mode = ?self.config.dns.answer_mode,
            "Starting nacos-dns server"
        );

        // Bind the push listener before creating the client so the port we
        // advertise at subscribe time is the one actually bound.
        let mut push_port = None;
        let mut push_updates = None;
        let mut listener_task = None;
        if let Some(addr) = self.config.registry.push_listen_addr {
            let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
            let listener = PushListener::bind(addr, tx).await?;
            push_port = Some(listener.local_addr()?.port());
            push_updates = Some(rx);
            listener_task = Some(tokio::spawn(listener.run(shutdown.clone())));
        }

        let client = NacosApiClient::new(&self.config.registry, push_port)?;
        let engine = Arc::new(SyncEngine::new(
            Arc::new(client),
            EngineOptions::from_config(&self.config),
        ));

        if let Some(dir) = &self.config.registry.cache_dir {
            match engine.cache().load_warm_dir(dir) {
                Ok(loaded) => info!(loaded, "imported warm cache"),
                Err(err) => warn!(%err, "warm cache import failed, starting cold"),
            }
        }

        info!("Fetching initial service listing from registry...");
        match engine.refresh_membership().await {
            Ok(count) => info!(count, "Initial service listing complete"),
            Err(err) => {
                warn!(%err, "Initial service listing failed, continuing with sweep-driven sync")
            }
        }

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(
            Arc::clone(&engine).run_membership_loop(shutdown.clone()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&engine).run_staleness_sweep(shutdown.clone()),
        ));
        if let Some(updates) = push_updates {
            tasks.push(tokio::spawn(
                Arc::clone(&engine).run_push_loop(updates, shutdown.clone()),
            ));
        }
        if let Some(task) = listener_task {
            tasks.push(task);
        }
        tasks.push(tokio::spawn(metrics_loop(
            Arc::clone(&engine),
            shutdown.clone(),
        )));

        // Create server
        let handler = DnsHandler::new(Arc::clone(&engine));
        let mut server = ServerFuture::new(handler);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.config.dns.listen_addr).await?;
        info!(addr = %self.config.dns.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.config.dns.listen_addr).await?;
        info!(addr = %self.config.dns.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, Duration::from_secs(30));

        info!("DNS server ready to serve queries");

        // Run server until shutdown
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        // Stop background tasks even when the server exited on its own.
        shutdown.cancel();
        for task in tasks {
            let _ = task.await;
        }

        info!("DNS server stopped");
        Ok(())
    }
}
