//! An in-memory signed zone for walking.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::base::iana::Rtype;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zonewalk::error::ResolveError;
use zonewalk::resolver::{QueryFuture, Record, Reply, Security};
use zonewalk::walker::{WalkOptions, WalkSummary};
use zonewalk::{DomainName, PartitionPlanner, Resolver};

//------------ MockZone ------------------------------------------------------

/// A zone answering queries the way an authoritative NSEC-signed zone does.
///
/// Existing names queried for NSEC get their NSEC record in the answer.
/// For any other query the covering or matching NSEC record is put into the
/// authority section together with the NSEC record of the apex, as happens
/// for a wildcard proof.
pub struct MockZone {
    /// All names of the zone in canonical order, apex first.
    names: Vec<DomainName>,
    security: Security,
    fail_every: u64,
    queries: AtomicU64,
}

impl MockZone {
    pub fn new(apex: &str, names: &[&str]) -> Self {
        let apex = name(apex);
        let mut all = vec![apex.clone()];
        for item in names {
            let item = name(item);
            assert!(item.ends_with(&apex), "{} not in zone", item);
            all.push(item);
        }
        all.sort();
        all.dedup();
        assert_eq!(all[0], apex);
        MockZone {
            names: all,
            security: Security::Secure,
            fail_every: 0,
            queries: AtomicU64::new(0),
        }
    }

    /// Makes all replies insecure.
    pub fn insecure(mut self) -> Self {
        self.security = Security::Insecure;
        self
    }

    /// Makes every `n`th query time out.
    pub fn failing_every(mut self, n: u64) -> Self {
        assert!(n > 1);
        self.fail_every = n;
        self
    }

    pub fn apex(&self) -> &DomainName {
        &self.names[0]
    }

    /// Returns the number of queries received so far.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Returns the NSEC record owned by the name at `index`.
    fn nsec_at(&self, index: usize) -> Record {
        Record::nsec(
            self.names[index].clone(),
            self.names[(index + 1) % self.names.len()].clone(),
        )
    }

    fn reply(&self, qname: &DomainName, qtype: Rtype) -> Reply {
        let mut reply = Reply::new(self.security);
        match self.names.binary_search(qname) {
            Ok(index) if qtype == Rtype::NSEC => {
                reply.answer.push(self.nsec_at(index));
            }
            Ok(index) => {
                reply.authority.push(self.nsec_at(index));
            }
            Err(index) => {
                // The apex is the smallest name, so index is never 0 for
                // names within the zone.
                let covering = index.saturating_sub(1);
                reply.authority.push(self.nsec_at(covering));
                if covering != 0 {
                    reply.authority.push(self.nsec_at(0));
                }
            }
        }
        reply
    }
}

impl Resolver for MockZone {
    fn query<'a>(
        &'a self,
        qname: &'a DomainName,
        qtype: Rtype,
    ) -> QueryFuture<'a> {
        let count = self.queries.fetch_add(1, Ordering::Relaxed) + 1;
        let res = if self.fail_every > 0 && count % self.fail_every == 0 {
            Err(ResolveError::Timeout(Duration::from_secs(1)))
        } else {
            Ok(vec![self.reply(qname, qtype)])
        };
        Box::pin(async move { res })
    }
}

//------------ Helpers -------------------------------------------------------

pub fn name(s: &str) -> DomainName {
    DomainName::normalize(s).unwrap()
}

/// Walk options without rate limit and with short retry delays.
pub fn fast_options() -> WalkOptions {
    WalkOptions {
        rate: 0,
        backoff: zonewalk::retry::Backoff::new(
            Duration::from_millis(10),
            Duration::from_millis(200),
        ),
    }
}

/// The outcome of a walk.
pub struct Walk {
    /// The names in the order they arrived.
    pub names: Vec<String>,
    pub summaries: Vec<WalkSummary>,
}

impl Walk {
    /// Returns the names sorted in canonical order.
    pub fn sorted(&self) -> Vec<String> {
        let mut names: Vec<_> = self.names.iter().map(|s| name(s)).collect();
        names.sort();
        names.into_iter().map(|name| name.to_string()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.summaries
            .iter()
            .all(|summary| summary.reason.is_complete())
    }
}

/// Walks a zone with the given planner.
pub async fn walk_with(
    zone: Arc<MockZone>,
    planner: &PartitionPlanner,
    shutdown: CancellationToken,
) -> Walk {
    let (tx, mut rx) = mpsc::channel::<DomainName>(16);
    let collect = async move {
        let mut names = Vec::new();
        while let Some(name) = rx.recv().await {
            names.push(name.to_string());
        }
        names
    };
    let (summaries, names) =
        tokio::join!(planner.run(zone, tx, shutdown), collect);
    Walk { names, summaries }
}

/// Walks a zone with `parallelism` partitions.
pub async fn walk(zone: Arc<MockZone>, parallelism: usize) -> Walk {
    let planner = PartitionPlanner::new(
        zone.apex().clone(),
        parallelism,
        None,
        fast_options(),
    )
    .unwrap();
    walk_with(zone, &planner, CancellationToken::new()).await
}
