//! Instance selection and DNS record rendering.
//!
//! Everything here is a pure function of its inputs: the only state any of
//! it touches is the round-robin index map handed in by the caller. A
//! selected instance becomes an address record for the queried name plus a
//! companion SRV record (`_<proto>.<qname>`) carrying port and weight; the
//! SRV target is the root label since the address records are glued into
//! the same answer.

use hickory_proto::rr::rdata::{A, AAAA, SRV};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use rand::Rng;
use std::net::IpAddr;

use crate::registry::Instance;
use crate::shard_map::ShardedMap;

/// Instances eligible to appear in an answer: healthy, enabled, and with a
/// positive weight.
pub fn eligible_instances(instances: &[Instance]) -> Vec<&Instance> {
    instances
        .iter()
        .filter(|host| host.healthy && host.enabled && host.weight > 0.0)
        .collect()
}

/// Expand the eligible instances by weight, replicating each one
/// `ceil(weight)` times in original order.
pub fn expand_weighted(instances: &[Instance]) -> Vec<Instance> {
    let mut expanded = Vec::new();
    for host in eligible_instances(instances) {
        let copies = host.weight.ceil() as usize;
        for _ in 0..copies {
            expanded.push(host.clone());
        }
    }
    expanded
}

/// Pick one eligible instance round-robin.
///
/// The index map holds the last-served index per service name; each call
/// advances it by one modulo the eligible count. The first call for a name
/// starts at a uniformly random index. Two concurrent callers may observe
/// the same index — only loose even distribution over time is needed.
pub fn round_robin_pick<'a>(
    service: &str,
    instances: &'a [Instance],
    index_map: &ShardedMap<String, usize>,
) -> Option<&'a Instance> {
    let eligible = eligible_instances(instances);
    if eligible.is_empty() {
        return None;
    }

    let index = match index_map.get(&service.to_string()) {
        None => rand::thread_rng().gen_range(0..eligible.len()),
        Some(last) => (last + 1) % eligible.len(),
    };
    index_map.insert(service.to_string(), index);

    Some(eligible[index])
}

/// Render one instance into an address record and its companion SRV.
///
/// The address family follows the query type: A queries render IPv4
/// instances, AAAA queries render IPv6 instances, mismatches yield `None`.
pub fn instance_records(
    qname: &Name,
    qtype: RecordType,
    ttl: u32,
    instance: &Instance,
) -> Option<(Record, Record)> {
    let rdata = match (qtype, instance.ip) {
        (RecordType::A, IpAddr::V4(ip)) => RData::A(A::from(ip)),
        (RecordType::AAAA, IpAddr::V6(ip)) => RData::AAAA(AAAA::from(ip)),
        _ => return None,
    };

    let mut address = Record::from_rdata(qname.clone(), ttl, rdata);
    address.set_dns_class(DNSClass::IN);

    let srv_name = Name::from_ascii(&format!("_{}.{}", instance.protocol(), qname)).ok()?;
    let srv = SRV::new(0, instance.weight as u16, instance.port, Name::root());
    let mut service = Record::from_rdata(srv_name, ttl, RData::SRV(srv));
    service.set_dns_class(DNSClass::IN);

    Some((address, service))
}
