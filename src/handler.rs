//! DNS request handling backed by the sync engine.
//!
//! The handler makes the per-query ownership decision and renders cached
//! instances into a response: address records in the answer section, the
//! companion SRV records in additionals. Names the registry does not know
//! are refused so a chained resolver can take the query instead.

use async_trait::async_trait;
use hickory_proto::op::{Header, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{Name, Record};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

use crate::error::DnsError;
use crate::metrics::{self, QueryResult, Timer};
use crate::sync::SyncEngine;

/// Discover the host's routable address by opening an unconnected UDP
/// socket towards a public address. No traffic is sent.
fn local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Requester address used for registry-side selection.
///
/// Loopback sources (e.g. a local stub resolver forwarding for the whole
/// host) are replaced with the host's routable IP so requester-scoped
/// selection on the registry side stays meaningful.
fn effective_client_ip(src: IpAddr) -> IpAddr {
    static LOCAL_IP: OnceLock<Option<IpAddr>> = OnceLock::new();
    if src.is_loopback() {
        if let Some(ip) = *LOCAL_IP.get_or_init(local_ip) {
            return ip;
        }
    }
    src
}

/// DNS handler answering service-name queries from the registry cache.
#[derive(Clone)]
pub struct DnsHandler {
    engine: Arc<SyncEngine>,
}

impl DnsHandler {
    /// Create a handler over the given engine.
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    async fn respond<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: &mut R,
    ) -> Result<ResponseInfo, DnsError> {
        let timer = Timer::start();

        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            let response = MessageResponseBuilder::from_message_request(request)
                .error_msg(request.header(), ResponseCode::NotImp);
            return Ok(response_handle.send_response(response).await?);
        }

        let request_info = request.request_info()?;
        let qtype = request_info.query.query_type();
        let rtype_str = format!("{:?}", qtype);

        let qname = Name::from(request_info.query.name().clone());
        let qname_str = qname.to_string();
        let service = qname_str.trim_end_matches('.');
        let client_ip = effective_client_ip(request_info.src.ip());

        if !self.engine.owns_name(service, client_ip).await {
            debug!(service, "name not managed, refusing for the next resolver");
            metrics::record_query(&rtype_str, QueryResult::Delegated, timer.elapsed());
            let response = MessageResponseBuilder::from_message_request(request)
                .error_msg(request.header(), ResponseCode::Refused);
            return Ok(response_handle.send_response(response).await?);
        }

        let pairs = self.engine.resolve(&qname, client_ip, qtype).await;
        let (answers, additionals): (Vec<Record>, Vec<Record>) = pairs.into_iter().unzip();

        debug!(service, %client_ip, count = answers.len(), "resolved");
        metrics::record_instances_returned(answers.len());
        let result = if answers.is_empty() {
            QueryResult::Empty
        } else {
            QueryResult::Success
        };
        metrics::record_query(&rtype_str, result, timer.elapsed());

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_recursion_available(true);

        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            answers.iter(),
            std::iter::empty(),
            std::iter::empty(),
            additionals.iter(),
        );
        Ok(response_handle.send_response(response).await?)
    }
}

#[async_trait]
impl RequestHandler for DnsHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        match self.respond(request, &mut response_handle).await {
            Ok(info) => info,
            Err(err) => {
                error!(%err, "request handling failed");
                metrics::record_query("unknown", QueryResult::Error, std::time::Duration::ZERO);
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
