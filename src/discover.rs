//! Finding the authoritative name servers of a zone.

use std::net::SocketAddr;
use std::vec::Vec;

use bytes::Bytes;
use domain::base::iana::Rtype;
use domain::base::name::ParsedName;
use domain::rdata::Ns;
use domain::resolv::StubResolver;
use tracing::{debug, warn};

use crate::name::DomainName;

/// Returns the addresses of the name servers of `zone`.
///
/// The NS records of the zone and the addresses of the hosts they name are
/// looked up through the system’s resolver. Hosts that can’t be resolved are
/// skipped. Returns `None` if no address at all was found.
pub async fn nameservers(zone: &DomainName) -> Option<Vec<SocketAddr>> {
    let qname = match zone.to_name() {
        Ok(qname) => qname,
        Err(err) => {
            warn!("cannot look up name servers of {}: {}", zone, err);
            return None;
        }
    };
    let resolver = StubResolver::new();
    let answer = match resolver.query((qname, Rtype::NS)).await {
        Ok(answer) => answer,
        Err(err) => {
            warn!("NS query for {} failed: {}", zone.fmt_with_dot(), err);
            return None;
        }
    };
    let section = match answer.answer() {
        Ok(section) => section,
        Err(err) => {
            warn!("bad NS response for {}: {}", zone.fmt_with_dot(), err);
            return None;
        }
    };

    let mut hosts: Vec<ParsedName<Bytes>> = Vec::new();
    for record in section.limit_to::<Ns<ParsedName<Bytes>>>() {
        match record {
            Ok(record) => hosts.push(record.data().nsdname().clone()),
            Err(err) => debug!("skipping broken NS record: {}", err),
        }
    }

    let mut addrs = Vec::new();
    for host in &hosts {
        match resolver.lookup_host(host).await {
            Ok(found) => {
                for addr in found.port_iter(53) {
                    if !addrs.contains(&addr) {
                        debug!("name server {} at {}", host, addr);
                        addrs.push(addr)
                    }
                }
            }
            Err(err) => warn!("cannot resolve name server {}: {}", host, err),
        }
    }

    if addrs.is_empty() {
        warn!("no name servers found for {}", zone.fmt_with_dot());
        None
    } else {
        Some(addrs)
    }
}
