//! Finding the next name of a zone.
//!
//! An NSEC record states that there are no names between its owner and its
//! next name. Asking for a name that doesn’t exist makes an authoritative
//! server prove the non-existence by including the NSEC record that covers
//! the name. Its next name is thus the first name of the zone after the one
//! asked for. [`NsecProbe`] does exactly that: it derives a name that sorts
//! immediately after a given name, asks for it, and picks the next name out
//! of the NSEC records in the reply.
//!
//! A reply may contain more NSEC records than the covering one, typically
//! the record proving that no wildcard exists. Only records whose next name
//! sorts after the probe name can be the covering one and of those the one
//! with the smallest next name is the tightest bracket. If there is none,
//! the covering record is the last record of the zone which wraps around to
//! the apex, i.e., the walk has arrived at the end.

use std::vec::Vec;

use domain::base::iana::Rtype;
use tracing::debug;

use crate::error::{NameError, ProbeError};
use crate::name::DomainName;
use crate::resolver::{Record, Reply, Resolver};

//------------ NsecRecord ----------------------------------------------------

/// The essence of an NSEC record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NsecRecord {
    /// The owner name.
    pub owner: DomainName,

    /// The next owner name of the zone.
    pub next_name: DomainName,
}

impl NsecRecord {
    /// Extracts the NSEC record from a reply record.
    ///
    /// Returns `None` if the record isn’t an NSEC record at all.
    pub fn from_record(record: &Record) -> Option<Result<Self, ProbeError>> {
        if !record.is_nsec() {
            return None;
        }
        Some(match record.next_name.as_ref() {
            Some(next_name) => Ok(NsecRecord {
                owner: record.owner.clone(),
                next_name: next_name.clone(),
            }),
            None => Err(ProbeError::MalformedNsec),
        })
    }
}

//------------ ProbeResult ---------------------------------------------------

/// The outcome of a successful probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProbeResult {
    /// The next name of the zone, lowercased.
    Next(DomainName),

    /// There is no further name: the chain has wrapped around to the apex.
    Wrapped,
}

//------------ NsecProbe -----------------------------------------------------

/// Asks a resolver for the names of a zone, one at a time.
#[derive(Clone, Debug)]
pub struct NsecProbe<R> {
    /// The resolver to ask.
    resolver: R,

    /// The apex of the zone.
    apex: DomainName,
}

impl<R> NsecProbe<R> {
    /// Creates a new probe for the zone with the given apex.
    pub fn new(resolver: R, apex: DomainName) -> Self {
        NsecProbe { resolver, apex }
    }

    /// Returns the apex of the zone.
    pub fn apex(&self) -> &DomainName {
        &self.apex
    }

    /// Returns the name to ask for when looking for the successor of `name`.
    ///
    /// This is [`DomainName::increment`] except for the apex. Changing the
    /// apex’s own label would leave the zone, so instead the label `\001`
    /// is added in front of it.
    pub fn probe_name(
        &self,
        name: &DomainName,
    ) -> Result<DomainName, NameError> {
        if *name == self.apex {
            self.apex.prepend(&[0x01])
        } else {
            name.increment()
        }
    }
}

impl<R: Resolver> NsecProbe<R> {
    /// Finds the name following `name`.
    pub async fn probe(
        &self,
        name: &DomainName,
    ) -> Result<ProbeResult, ProbeError> {
        let probe_name = self.probe_name(name)?;
        let reply = self.first_reply(&probe_name, Rtype::A).await?;
        select_next(&probe_name, &reply.authority)
    }

    /// Finds the first name at or after `name`.
    ///
    /// This asks for the NSEC record of `name` itself. If the name exists,
    /// the record is returned in the answer section and `name` is the
    /// result. Otherwise, the reply proves the non-existence of `name` and
    /// the next name is chosen just as [`probe`][Self::probe] does.
    pub async fn seek(
        &self,
        name: &DomainName,
    ) -> Result<ProbeResult, ProbeError> {
        let reply = self.first_reply(name, Rtype::NSEC).await?;
        let exists = reply
            .answer
            .iter()
            .filter_map(NsecRecord::from_record)
            .filter_map(Result::ok)
            .any(|record| record.owner == *name);
        if exists {
            return Ok(ProbeResult::Next(name.to_canonical()));
        }
        let records: Vec<_> =
            reply.answer.iter().chain(&reply.authority).cloned().collect();
        select_next(name, &records)
    }

    /// Sends a query and returns the first secure reply.
    async fn first_reply(
        &self,
        qname: &DomainName,
        qtype: Rtype,
    ) -> Result<Reply, ProbeError> {
        let mut replies = self.resolver.query(qname, qtype).await?.into_iter();
        let reply = replies.next().ok_or(ProbeError::EmptyResponse)?;
        if replies.len() > 0 {
            debug!(
                "{} replies for {}, using the first",
                replies.len() + 1,
                qname.fmt_with_dot()
            );
        }
        if !reply.is_secure() {
            return Err(ProbeError::Unsecured);
        }
        Ok(reply)
    }
}

/// Picks the closest next name after `probe_name` from NSEC records.
///
/// Broken NSEC records are skipped as long as a usable one remains. If
/// there are no NSEC records at all or none that could be used, the reply
/// proves nothing and the probe has to be repeated.
fn select_next(
    probe_name: &DomainName,
    records: &[Record],
) -> Result<ProbeResult, ProbeError> {
    let mut seen = false;
    let mut malformed = false;
    let mut best: Option<&DomainName> = None;
    for record in records.iter().filter(|record| record.is_nsec()) {
        seen = true;
        let next_name = match record.next_name.as_ref() {
            Some(next_name) => next_name,
            None => {
                malformed = true;
                continue;
            }
        };
        if next_name > probe_name && best.map_or(true, |best| next_name < best)
        {
            best = Some(next_name)
        }
    }
    match best {
        Some(best) => Ok(ProbeResult::Next(best.to_canonical())),
        None if !seen => Err(ProbeError::MissingNsec),
        None if malformed => Err(ProbeError::MalformedNsec),
        None => Ok(ProbeResult::Wrapped),
    }
}

//============ Testing =======================================================
