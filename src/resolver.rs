//! The resolver collaborator.
//!
//! Walking a zone needs exactly one thing from the DNS: send a question and
//! get back the NSEC records of the answer and authority sections of the
//! response, together with a verdict on whether the response can be
//! trusted. The [`Resolver`] trait captures this. It deliberately knows
//! nothing about transports or validation. Those are up to the
//! implementation, see [`UpstreamResolver`] for the one used by the
//! `zonewalk` binary.
//!
//! [`UpstreamResolver`]: crate::upstream::UpstreamResolver

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::vec::Vec;

use domain::base::iana::Rtype;

use crate::error::ResolveError;
use crate::name::DomainName;

//------------ Resolver ------------------------------------------------------

/// The future returned by [`Resolver::query`].
pub type QueryFuture<'a> = Pin<
    Box<dyn Future<Output = Result<Vec<Reply>, ResolveError>> + Send + 'a>,
>;

/// A resolver that can be shared between concurrent walkers.
///
/// A query may produce more than one reply if the implementation asks
/// several servers. An empty list means that no reply arrived. Query
/// timeouts are the implementation’s business: the returned future has to
/// resolve eventually.
pub trait Resolver: Send + Sync {
    /// Queries for the given name and record type.
    fn query<'a>(
        &'a self,
        qname: &'a DomainName,
        qtype: Rtype,
    ) -> QueryFuture<'a>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn query<'a>(
        &'a self,
        qname: &'a DomainName,
        qtype: Rtype,
    ) -> QueryFuture<'a> {
        (**self).query(qname, qtype)
    }
}

impl<R: Resolver + ?Sized> Resolver for Box<R> {
    fn query<'a>(
        &'a self,
        qname: &'a DomainName,
        qtype: Rtype,
    ) -> QueryFuture<'a> {
        (**self).query(qname, qtype)
    }
}

//------------ Security ------------------------------------------------------

/// Whether a reply was found to be DNSSEC-secure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Security {
    /// The reply is backed by valid DNSSEC evidence.
    Secure,

    /// The reply is not, or cannot be, authenticated.
    Insecure,
}

//------------ Record --------------------------------------------------------

/// A record of interest from a reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// The owner name of the record.
    pub owner: DomainName,

    /// The record type.
    pub rtype: Rtype,

    /// The next owner name for NSEC records.
    ///
    /// This is `None` for other record types and for NSEC records whose
    /// data could not be parsed.
    pub next_name: Option<DomainName>,
}

impl Record {
    /// Creates an NSEC record.
    pub fn nsec(owner: DomainName, next_name: DomainName) -> Self {
        Record {
            owner,
            rtype: Rtype::NSEC,
            next_name: Some(next_name),
        }
    }

    /// Returns whether this is an NSEC record.
    pub fn is_nsec(&self) -> bool {
        self.rtype == Rtype::NSEC
    }
}

//------------ Reply ---------------------------------------------------------

/// A reply to a query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    /// The security status of the reply.
    pub security: Security,

    /// The records of interest in the answer section.
    pub answer: Vec<Record>,

    /// The records of interest in the authority section.
    pub authority: Vec<Record>,
}

impl Reply {
    /// Creates an empty reply with the given security status.
    pub fn new(security: Security) -> Self {
        Reply {
            security,
            answer: Vec::new(),
            authority: Vec::new(),
        }
    }

    /// Creates a secure reply with the given authority records.
    pub fn secure(authority: Vec<Record>) -> Self {
        Reply {
            authority,
            ..Self::new(Security::Secure)
        }
    }

    /// Returns whether the reply is secure.
    pub fn is_secure(&self) -> bool {
        self.security == Security::Secure
    }
}
