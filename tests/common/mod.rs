//! Shared test infrastructure for resolve/withdrawal integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use nacos_dns::error::DnsError;
use nacos_dns::registry::{Instance, RegistryClient, ServiceInfo};
use nacos_dns::sync::{EngineOptions, SyncEngine};
use nacos_dns::DnsHandler;

// --- Constants ---

pub const CLIENT_A: &str = "10.1.0.1:33000";
pub const CLIENT_B: &str = "10.2.0.2:33000";

// --- MockRegistry ---

/// In-memory registry with call counters, shared behind an `Arc` so tests
/// can mutate registry state while the engine holds the client.
#[derive(Default)]
pub struct MockRegistry {
    pub services: Mutex<HashMap<String, ServiceInfo>>,
    pub listing: Mutex<Vec<String>>,
    pub get_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub unsubscribe_calls: AtomicUsize,
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a service with the given instances and add it to the
    /// listing.
    pub fn set_service(&self, name: &str, instances: Vec<Instance>) {
        self.services.lock().unwrap().insert(
            name.to_string(),
            ServiceInfo {
                name: name.to_string(),
                cache_millis: 0,
                hosts: instances,
                last_ref_time: 1,
            },
        );
        let mut listing = self.listing.lock().unwrap();
        if !listing.iter().any(|n| n == name) {
            listing.push(name.to_string());
        }
    }

    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn service_names(&self, page_no: u32, page_size: u32) -> Result<Vec<String>, DnsError> {
        let listing = self.listing.lock().unwrap();
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
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(service)
            .cloned()
            .unwrap_or_default())
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

// --- Instance builders ---

pub fn make_instance(ip: &str, port: u16, weight: f64, service: &str) -> Instance {
    Instance {
        ip: ip.parse().unwrap(),
        port,
        weight,
        healthy: true,
        enabled: true,
        metadata: HashMap::new(),
        service_name: service.to_string(),
    }
}

pub fn make_unhealthy_instance(ip: &str, port: u16, service: &str) -> Instance {
    Instance {
        healthy: false,
        ..make_instance(ip, port, 1.0, service)
    }
}

// --- Engine/handler builders ---

/// Build an engine over the mock with membership pre-synced.
pub async fn build_engine(registry: &Arc<MockRegistry>, options: EngineOptions) -> Arc<SyncEngine> {
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(registry) as Arc<dyn RegistryClient>,
        options,
    ));
    engine.refresh_membership().await.expect("initial listing");
    engine
}

pub fn build_handler(engine: &Arc<SyncEngine>) -> DnsHandler {
    DnsHandler::new(Arc::clone(engine))
}

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to
/// `RequestHandler::handle_request()`. The response is serialized via
/// `MessageResponse::destructive_emit()` and stored as raw wire-format
/// bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` with a crafted source address.
pub fn build_request(name: &str, record_type: RecordType, src: SocketAddr, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    Request::new(msg, src, Protocol::Udp)
}

// --- Response helpers ---

/// Execute a query through the handler and return the parsed response.
pub async fn execute_query(
    handler: &DnsHandler,
    name: &str,
    record_type: RecordType,
    src: &str,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, src.parse().unwrap(), id);
    let capture = TestResponseHandler::new();
    handler.handle_request(&request, capture.clone()).await;
    capture.into_message()
}

/// Extract A record addresses from a response's answer section.
pub fn extract_a_ips(msg: &Message) -> Vec<IpAddr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(IpAddr::V4(Ipv4Addr::from(*a))),
            _ => None,
        })
        .collect()
}

/// Extract (srv name, port, weight) triples from the additionals section.
pub fn extract_srvs(msg: &Message) -> Vec<(String, u16, u16)> {
    msg.additionals()
        .iter()
        .filter_map(|r| match r.data() {
            RData::SRV(srv) => Some((r.name().to_string(), srv.port(), srv.weight())),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
