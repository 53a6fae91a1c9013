//! The resolver talking to actual DNS servers.
//!
//! [`UpstreamResolver`] sends the queries of a walk to one or more servers
//! through the client transports of the `domain` crate: a UDP transport
//! falling back to TCP for truncated responses per server, all of them
//! combined into a redundant connection that prefers whichever server
//! answers fastest.
//!
//! A response is secure if it has the AD bit set. A validating recursive
//! resolver sets the bit itself. Responses of authoritative servers pass
//! through the validator transport of the `domain` crate first, which
//! checks them against the root trust anchor with the help of a set of
//! recursive resolvers and sets the bit only for secure responses.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::vec::Vec;

use bytes::Bytes;
use domain::base::iana::{Rcode, Rtype};
use domain::base::message::RecordSection;
use domain::base::name::ParsedName;
use domain::base::{Message, MessageBuilder};
use domain::net::client::protocol::{TcpConnect, UdpConnect};
use domain::net::client::request::{
    ComposeRequest, RequestMessage, SendRequest,
};
use domain::net::client::{
    dgram, dgram_stream, multi_stream, redundant, stream, validator,
};
use domain::rdata::Nsec;
use domain::resolv::stub::conf::ResolvConf;
use domain::validator::anchor::TrustAnchors;
use domain::validator::context::ValidationContext;
use tracing::{debug, trace};

use crate::error::ResolveError;
use crate::name::DomainName;
use crate::resolver::{QueryFuture, Record, Reply, Resolver, Security};

/// The EDNS UDP payload size advertised.
const UDP_PAYLOAD_SIZE: u16 = 1232;

/// The key signing key of the root zone.
const ROOT_ANCHOR: &str = ". 172800 IN DNSKEY 257 3 8 \
    AwEAAaz/tAm8yTn4Mfeh5eyI96WSVexTBAvkMgJzkKTOiW1vkIbzxeF3+/4RgWOq7HrxRi\
    xHlFlExOLAJr5emLvN7SWXgnLh4+B5xQlNVz8Og8kvArMtNROxVQuCaSnIDdD5LKyWbRd2\
    n9WGe2R8PzgCmr3EgVLrjyBxWezF0jLHwVN8efS3rCj/EWgvIWgb9tarpVUDK/b58Da+sq\
    qls3eNbuv7pr+eoZG+SrDK6nWeL3c6H5Apxz7LjVc1uTIdsIXxuOLYA4/ilBmSVIzuDWfd\
    RUfhHdY6+cn8HFRm+2hM8AnXGXws9555KrUB5qihylGa8subX2Nn6UwNR1AkUTV74bU=";

/// The request type of all transports.
type Request = RequestMessage<Bytes>;

/// A transport for one upstream server.
type Upstream = Box<dyn SendRequest<Request> + Send + Sync>;

/// The transport queries are sent through.
type Transport = Arc<dyn SendRequest<Request> + Send + Sync>;

//------------ Trust ---------------------------------------------------------

/// Who vouches for a response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Trust {
    /// The upstream validates and signals success with the AD bit.
    AuthenticatedData,

    /// Responses are validated locally.
    Validated,
}

//------------ UpstreamResolver ----------------------------------------------

/// A resolver sending queries to a set of DNS servers.
#[derive(Clone)]
pub struct UpstreamResolver {
    conn: Transport,
    timeout: Duration,
    trust: Trust,
}

impl UpstreamResolver {
    /// Sets up connections to the given validating resolvers.
    pub async fn connect(
        servers: &[SocketAddr],
        timeout: Duration,
    ) -> Result<Self, ResolveError> {
        let conn = redundant_connection(servers, timeout).await?;
        Ok(UpstreamResolver {
            conn: Arc::new(conn),
            timeout,
            trust: Trust::AuthenticatedData,
        })
    }

    /// Sets up connections to non-validating servers.
    ///
    /// Responses from `servers` are validated locally. The DNSKEY and DS
    /// records needed for that are looked up through `resolvers`.
    pub async fn validating(
        servers: &[SocketAddr],
        resolvers: &[SocketAddr],
        timeout: Duration,
    ) -> Result<Self, ResolveError> {
        let anchors = TrustAnchors::from_u8(ROOT_ANCHOR.as_bytes())?;
        let conn = redundant_connection(servers, timeout).await?;
        let lookup = redundant_connection(resolvers, timeout).await?;
        let context = Arc::new(ValidationContext::new(anchors, lookup));
        Ok(UpstreamResolver {
            conn: Arc::new(validator::Connection::new(conn, context)),
            timeout,
            trust: Trust::Validated,
        })
    }

    /// Returns the trust mode.
    pub fn trust(&self) -> Trust {
        self.trust
    }

    async fn query_impl(
        &self,
        qname: &DomainName,
        qtype: Rtype,
    ) -> Result<Vec<Reply>, ResolveError> {
        let mut msg = MessageBuilder::new_bytes();
        msg.header_mut()
            .set_rd(self.trust == Trust::AuthenticatedData);
        msg.header_mut().set_ad(true);
        let mut msg = msg.question();
        msg.push((qname.to_name()?, qtype))
            .map_err(|_| ResolveError::Compose)?;
        let mut req = RequestMessage::new(msg.into_message())?;
        req.set_dnssec_ok(true);

        let mut request = self.conn.send_request(req);
        let response =
            tokio::time::timeout(self.timeout, request.get_response())
                .await
                .map_err(|_| ResolveError::Timeout(self.timeout))??;
        Ok(vec![reply(&response)?])
    }
}

impl Resolver for UpstreamResolver {
    fn query<'a>(
        &'a self,
        qname: &'a DomainName,
        qtype: Rtype,
    ) -> QueryFuture<'a> {
        Box::pin(self.query_impl(qname, qtype))
    }
}

/// Creates a redundant connection over all `servers`.
async fn redundant_connection(
    servers: &[SocketAddr],
    timeout: Duration,
) -> Result<redundant::Connection<Request>, ResolveError> {
    if servers.is_empty() {
        return Err(ResolveError::NoUpstream);
    }

    let mut stream_config = stream::Config::new();
    stream_config.set_response_timeout(timeout);
    let mut dgram_config = dgram::Config::new();
    dgram_config.set_read_timeout(timeout);
    dgram_config.set_max_retries(1);
    dgram_config.set_udp_payload_size(Some(UDP_PAYLOAD_SIZE));
    let config = dgram_stream::Config::from_parts(
        dgram_config,
        multi_stream::Config::from(stream_config),
    );

    let (conn, transport) = redundant::Connection::new();
    let run_fut = transport.run();
    tokio::spawn(async move {
        run_fut.await;
        trace!("redundant transport terminated");
    });

    for addr in servers {
        let (udptcp, transport) = dgram_stream::Connection::with_config(
            UdpConnect::new(*addr),
            TcpConnect::new(*addr),
            config.clone(),
        );
        let addr = *addr;
        tokio::spawn(async move {
            transport.run().await;
            trace!("transport for {} terminated", addr);
        });
        conn.add(upstream(udptcp)).await?;
        debug!("using upstream server {}", addr);
    }
    Ok(conn)
}

fn upstream<T>(conn: T) -> Upstream
where
    T: SendRequest<Request> + Send + Sync + 'static,
{
    Box::new(conn)
}

/// Converts a response into a reply.
fn reply(msg: &Message<Bytes>) -> Result<Reply, ResolveError> {
    let rcode = msg.header().rcode();
    if rcode != Rcode::NOERROR && rcode != Rcode::NXDOMAIN {
        return Err(ResolveError::Rcode(rcode));
    }
    let mut answer = Vec::new();
    let mut authority = Vec::new();
    collect_nsec(msg.answer()?, &mut answer)?;
    collect_nsec(msg.authority()?, &mut authority)?;
    Ok(Reply {
        security: if msg.header().ad() {
            Security::Secure
        } else {
            Security::Insecure
        },
        answer,
        authority,
    })
}

/// Collects the NSEC records of a section.
fn collect_nsec(
    section: RecordSection<'_, Bytes>,
    records: &mut Vec<Record>,
) -> Result<(), ResolveError> {
    for record in section {
        let record = record?;
        if record.rtype() != Rtype::NSEC {
            continue;
        }
        let owner = DomainName::from_name(&record.owner())?;
        let next_name =
            match record.to_record::<Nsec<Bytes, ParsedName<Bytes>>>() {
                Ok(Some(nsec)) => {
                    DomainName::from_name(nsec.data().next_name()).ok()
                }
                _ => None,
            };
        records.push(Record {
            owner: owner.to_canonical(),
            rtype: Rtype::NSEC,
            next_name,
        });
    }
    Ok(())
}

/// Returns the name servers configured for the system.
///
/// Each address is only returned once even if it is configured for
/// several transports.
pub fn system_servers() -> Vec<SocketAddr> {
    let conf = ResolvConf::default();
    let mut servers: Vec<SocketAddr> = Vec::new();
    for server in &conf.servers {
        if !servers.contains(&server.addr) {
            servers.push(server.addr)
        }
    }
    servers
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::base::iana::SecAlg;
    use domain::base::{Name, Ttl};
    use domain::rdata::dnssec::{ProtoRrsig, RtypeBitmapBuilder, Timestamp};
    use std::str::FromStr;

    /// A signed NXDOMAIN response for `b.example.com`.
    fn nxdomain(ad: bool) -> Message<Bytes> {
        let owner = Name::vec_from_str("a.example.com").unwrap();
        let next = Name::vec_from_str("c.example.com").unwrap();
        let signer = Name::vec_from_str("example.com").unwrap();
        let mut types = RtypeBitmapBuilder::new_vec();
        types.add(Rtype::A).unwrap();
        types.add(Rtype::RRSIG).unwrap();
        types.add(Rtype::NSEC).unwrap();
        let rrsig = ProtoRrsig::new(
            Rtype::NSEC,
            SecAlg::ECDSAP256SHA256,
            3,
            Ttl::from_secs(3600),
            Timestamp::from(u32::MAX),
            Timestamp::from(0),
            4711,
            signer,
        )
        .into_rrsig(vec![0u8; 64])
        .unwrap();

        let mut msg = MessageBuilder::new_bytes();
        msg.header_mut().set_qr(true);
        msg.header_mut().set_rcode(Rcode::NXDOMAIN);
        msg.header_mut().set_ad(ad);
        let mut msg = msg.authority();
        msg.push((
            owner.clone(),
            Ttl::from_secs(3600),
            Nsec::new(next, types.finalize()),
        ))
        .unwrap();
        msg.push((owner, Ttl::from_secs(3600), rrsig)).unwrap();
        msg.into_message()
    }

    #[tokio::test]
    async fn refuses_empty_server_list() {
        let res =
            UpstreamResolver::connect(&[], Duration::from_secs(1)).await;
        assert!(matches!(res, Err(ResolveError::NoUpstream)));
    }

    #[tokio::test]
    async fn validating_needs_resolvers() {
        let addr = SocketAddr::from_str("192.0.2.1:53").unwrap();
        let res = UpstreamResolver::validating(
            &[addr],
            &[],
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(res, Err(ResolveError::NoUpstream)));
    }

    #[tokio::test]
    async fn unreachable_server_times_out() {
        // A port in the documentation range that nothing answers on.
        let addr = SocketAddr::from_str("192.0.2.1:53").unwrap();
        let resolver =
            UpstreamResolver::connect(&[addr], Duration::from_millis(50))
                .await
                .unwrap();
        assert_eq!(resolver.trust(), Trust::AuthenticatedData);
        let name = DomainName::normalize("example.com").unwrap();
        let res = resolver.query(&name, Rtype::A).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn validating_resolver_times_out() {
        let addr = SocketAddr::from_str("192.0.2.1:53").unwrap();
        let resolver = UpstreamResolver::validating(
            &[addr],
            &[addr],
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert_eq!(resolver.trust(), Trust::Validated);
        let name = DomainName::normalize("example.com").unwrap();
        assert!(resolver.query(&name, Rtype::A).await.is_err());
    }

    #[test]
    fn root_anchor_parses() {
        assert!(TrustAnchors::from_u8(ROOT_ANCHOR.as_bytes()).is_ok());
    }

    #[test]
    fn signatures_alone_are_not_secure() {
        let reply = reply(&nxdomain(false)).unwrap();
        assert_eq!(reply.security, Security::Insecure);
        assert_eq!(reply.authority.len(), 1);
        assert_eq!(
            reply.authority[0].next_name,
            Some(DomainName::normalize("c.example.com").unwrap())
        );
    }

    #[test]
    fn authenticated_data_is_secure() {
        let reply = reply(&nxdomain(true)).unwrap();
        assert_eq!(reply.security, Security::Secure);
        assert!(reply.answer.is_empty());
        assert_eq!(
            reply.authority[0].owner,
            DomainName::normalize("a.example.com").unwrap()
        );
    }

    #[test]
    fn server_failure_is_an_error() {
        let mut msg = MessageBuilder::new_bytes();
        msg.header_mut().set_qr(true);
        msg.header_mut().set_rcode(Rcode::SERVFAIL);
        let msg = msg.into_message();
        assert!(matches!(
            reply(&msg),
            Err(ResolveError::Rcode(Rcode::SERVFAIL))
        ));
    }
}
