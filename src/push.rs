//! UDP listener for registry push notifications.
//!
//! The registry delivers instance changes for subscribed services as JSON
//! datagrams to the UDP port we advertised at subscribe time. Each envelope
//! is acknowledged back to the sender; the decoded instance set is
//! forwarded into the engine's push channel. Malformed payloads are logged
//! and dropped, keeping the last-known-good snapshot in place.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DnsError;
use crate::metrics::{self, PushEventKind};
use crate::registry::{PushUpdate, ServiceInfo};

/// Envelope of a registry push datagram.
#[derive(Debug, Deserialize)]
struct PushPacket {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: String,
    #[serde(default, rename = "lastRefTime")]
    last_ref_time: i64,
}

/// Acknowledgement echoed back for every parsed envelope.
#[derive(Debug, Serialize)]
struct PushAck<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(rename = "lastRefTime")]
    last_ref_time: i64,
    data: &'a str,
}

/// Decode a datagram into the update to forward, if any.
///
/// Returns the ack payload alongside so transport and parsing stay
/// separately testable.
fn decode_packet(raw: &[u8]) -> Result<(Option<PushUpdate>, Vec<u8>), DnsError> {
    let packet: PushPacket = serde_json::from_slice(raw)?;
    let ack = serde_json::to_vec(&PushAck {
        kind: "push-ack",
        last_ref_time: packet.last_ref_time,
        data: "",
    })?;

    let update = match packet.kind.as_str() {
        "dom" | "service" => {
            let info: ServiceInfo = serde_json::from_str(&packet.data)?;
            Some(PushUpdate {
                instances: info.hosts,
            })
        }
        other => {
            debug!(kind = other, "ignoring push packet");
            None
        }
    };

    Ok((update, ack))
}

/// Receives registry push datagrams and forwards them to the sync engine.
pub struct PushListener {
    socket: UdpSocket,
    updates: mpsc::Sender<PushUpdate>,
}

impl PushListener {
    /// Bind the listener on `addr`.
    pub async fn bind(addr: SocketAddr, updates: mpsc::Sender<PushUpdate>) -> Result<Self, DnsError> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "push listener bound");
        Ok(Self { socket, updates })
    }

    /// The locally bound address (port is what we advertise at subscribe).
    pub fn local_addr(&self) -> Result<SocketAddr, DnsError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive datagrams until the channel closes or shutdown is requested.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("push listener shutting down");
                    return;
                }

                received = self.socket.recv_from(&mut buf) => {
                    let (len, src) = match received {
                        Ok(received) => received,
                        Err(err) => {
                            warn!(%err, "push receive failed");
                            continue;
                        }
                    };

                    match decode_packet(&buf[..len]) {
                        Ok((update, ack)) => {
                            if let Err(err) = self.socket.send_to(&ack, src).await {
                                warn!(%src, %err, "push ack failed");
                            }
                            if let Some(update) = update {
                                debug!(count = update.instances.len(), %src, "push update received");
                                if self.updates.send(update).await.is_err() {
                                    info!("push channel closed, stopping listener");
                                    return;
                                }
                            }
                        }
                        Err(err) => {
                            warn!(%src, %err, "discarding malformed push payload");
                            metrics::record_push_event(PushEventKind::Malformed);
                        }
                    }
                }
            }
        }
    }
}
