//! Registry client: wire model, client trait, and the HTTP implementation.
//!
//! The sync engine depends on [`RegistryClient`], not on a transport. The
//! production implementation, [`NacosApiClient`], talks to the registry's
//! v1 open API over HTTP; tests substitute an in-memory mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::error::DnsError;

/// One registry-reported endpoint of a service.
///
/// Instances are immutable snapshots: a changed instance arrives as a new
/// value over the pull or push channel, never as an in-place mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Endpoint address.
    pub ip: IpAddr,
    /// Endpoint port.
    pub port: u16,
    /// Load-balancing weight; non-positive weights are never served.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Health-check verdict. Older payloads call this `valid`.
    #[serde(default = "default_true", alias = "valid")]
    pub healthy: bool,
    /// Operator switch; disabled instances are never served.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Free-form metadata; the `protocol` key names the SRV protocol tag.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Owning service name, possibly group-qualified (`group@@name`).
    #[serde(default)]
    pub service_name: String,
}

impl Instance {
    /// The protocol tag from instance metadata, `tcp` when absent or empty.
    pub fn protocol(&self) -> &str {
        match self.metadata.get("protocol") {
            Some(proto) if !proto.is_empty() => proto,
            _ => "tcp",
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A service's instance list as returned by the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Service name. Older payloads call this `dom`.
    #[serde(default, alias = "dom")]
    pub name: String,
    /// How long the payload may be cached, in milliseconds.
    #[serde(default)]
    pub cache_millis: u64,
    /// Instances currently registered for the service.
    #[serde(default)]
    pub hosts: Vec<Instance>,
    /// Server-side timestamp of the last refresh, in milliseconds.
    #[serde(default)]
    pub last_ref_time: u64,
}

/// One page of the registry's service-name listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicePage {
    /// Total service count on the registry side.
    #[serde(default)]
    pub count: i64,
    /// Service names on this page.
    #[serde(default)]
    pub doms: Vec<String>,
}

/// An instance delta delivered over the push channel.
///
/// An empty instance list signals a possible withdrawal without naming the
/// affected service; the engine re-derives which names actually went empty.
#[derive(Debug, Clone)]
pub struct PushUpdate {
    /// The pushed instance set.
    pub instances: Vec<Instance>,
}

/// Operations the sync engine needs from the registry.
///
/// Every method carries a bounded timeout; on timeout the caller treats the
/// call as a failed fetch and relies on the next scheduled sweep, never an
/// inline retry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// One page of the service-name listing.
    async fn service_names(&self, page_no: u32, page_size: u32) -> Result<Vec<String>, DnsError>;

    /// The current instance list for `service`.
    ///
    /// `client_ip` lets the registry apply requester-scoped selection
    /// (cluster affinity) when it supports it.
    async fn get_service(
        &self,
        service: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<ServiceInfo, DnsError>;

    /// Register push interest in `service`.
    async fn subscribe(&self, service: &str) -> Result<(), DnsError>;

    /// Drop push interest in `service`.
    async fn unsubscribe(&self, service: &str) -> Result<(), DnsError>;
}

/// HTTP client for the registry's v1 open API.
#[derive(Debug, Clone)]
pub struct NacosApiClient {
    http: reqwest::Client,
    base_url: String,
    namespace: String,
    /// Local UDP port advertised to the registry for push delivery.
    push_port: Option<u16>,
}

impl NacosApiClient {
    /// Build a client for the configured registry server.
    pub fn new(config: &RegistryConfig, push_port: Option<u16>) -> Result<Self, DnsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: format!("http://{}/nacos/v1/ns", config.server_addr),
            namespace: config.namespace.clone(),
            push_port,
        })
    }

    async fn instance_list(
        &self,
        service: &str,
        client_ip: Option<IpAddr>,
        udp_port: Option<u16>,
    ) -> Result<ServiceInfo, DnsError> {
        let url = format!("{}/instance/list", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("serviceName", service.to_string()),
            ("namespaceId", self.namespace.clone()),
            ("healthyOnly", "false".to_string()),
        ];
        if let Some(ip) = client_ip {
            query.push(("clientIP", ip.to_string()));
        }
        if let Some(port) = udp_port {
            query.push(("udpPort", port.to_string()));
        }

        let info: ServiceInfo = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if info.hosts.is_empty() {
            debug!(service, "registry returned an empty instance list");
        }

        Ok(info)
    }
}

#[async_trait]
impl RegistryClient for NacosApiClient {
    async fn service_names(&self, page_no: u32, page_size: u32) -> Result<Vec<String>, DnsError> {
        let url = format!("{}/service/list", self.base_url);
        let page: ServicePage = self
            .http
            .get(&url)
            .query(&[
                ("pageNo", page_no.to_string()),
                ("pageSize", page_size.to_string()),
                ("namespaceId", self.namespace.clone()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(page.doms)
    }

    async fn get_service(
        &self,
        service: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<ServiceInfo, DnsError> {
        self.instance_list(service, client_ip, None).await
    }

    async fn subscribe(&self, service: &str) -> Result<(), DnsError> {
        // v1 push interest rides on the instance-list query: passing our
        // UDP port registers this process as a push client for the service.
        let Some(port) = self.push_port else {
            warn!(service, "push listener disabled, subscription is a no-op");
            return Ok(());
        };
        self.instance_list(service, None, Some(port)).await?;
        Ok(())
    }

    async fn unsubscribe(&self, service: &str) -> Result<(), DnsError> {
        // v1 push registrations expire server-side; re-querying without a
        // udpPort stops refreshing ours so it lapses at the next expiry.
        self.instance_list(service, None, None).await?;
        Ok(())
    }
}
