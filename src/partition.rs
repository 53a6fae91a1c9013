//! Splitting a walk into concurrent partitions.
//!
//! Walking a large zone one name at a time is slow. Since NSEC records allow
//! starting a walk at any name, the zone can be cut into slices at the first
//! label directly below the apex, each walked by its own task. The cuts are
//! made at the symbols of [`ALPHABET`], which covers the host names that
//! make up the vast majority of most zones.
//!
//! Partition 0 starts at the apex and thus also picks up all names sorting
//! before the first symbol. The last partition has no upper bound and picks
//! up all names sorting after the last one. Every other partition starts at
//! its symbol and stops before the start of the next one, so the partitions
//! are disjoint and together cover the whole zone.

use std::ops::Range;
use std::vec::Vec;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ConfigError;
use crate::name::DomainName;
use crate::probe::NsecProbe;
use crate::resolver::Resolver;
use crate::walker::{WalkOptions, WalkSummary, ZoneWalker};

//------------ Constants -----------------------------------------------------

/// The first-label symbols partitions are cut at, in canonical order.
pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The maximum number of partitions.
pub const MAX_PARALLELISM: usize = ALPHABET.len();

//------------ Partition -----------------------------------------------------

/// One slice of a zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Partition {
    /// The position of the partition.
    pub index: usize,

    /// The name to start walking from.
    pub start: DomainName,

    /// The first name that belongs to the next partition.
    pub end: Option<DomainName>,

    /// Whether `start` is a boundary that itself needs to be looked up.
    pub from_boundary: bool,

    /// The indexes into [`ALPHABET`] of the symbols owned.
    pub symbols: Range<usize>,
}

//------------ PartitionPlanner ----------------------------------------------

/// Plans the partitions of a walk and runs them.
#[derive(Clone, Debug)]
pub struct PartitionPlanner {
    zone: DomainName,
    partitions: Vec<Partition>,
    options: WalkOptions,
}

impl PartitionPlanner {
    /// Plans a walk of `zone` with `parallelism` partitions.
    ///
    /// A walk can be resumed after a `start` name, but only if there is a
    /// single partition.
    pub fn new(
        zone: DomainName,
        parallelism: usize,
        start: Option<DomainName>,
        options: WalkOptions,
    ) -> Result<Self, ConfigError> {
        if !(1..=MAX_PARALLELISM).contains(&parallelism) {
            return Err(ConfigError::Parallelism(parallelism));
        }
        if start.is_some() && parallelism > 1 {
            return Err(ConfigError::StartWithParallel);
        }
        let zone = zone.to_canonical();
        let step = MAX_PARALLELISM / parallelism;

        let boundary = |index: usize| -> Result<DomainName, ConfigError> {
            zone.prepend(&ALPHABET[index * step..index * step + 1])
                .map_err(|source| ConfigError::Zone {
                    name: zone.to_string(),
                    source,
                })
        };

        let mut partitions = Vec::with_capacity(parallelism);
        for index in 0..parallelism {
            let end = if index + 1 < parallelism {
                Some(boundary(index + 1)?)
            } else {
                None
            };
            let (start, from_boundary) = if index == 0 {
                (start.clone().unwrap_or_else(|| zone.clone()), false)
            } else {
                (boundary(index)?, true)
            };
            let symbols = if index + 1 < parallelism {
                index * step..(index + 1) * step
            } else {
                index * step..MAX_PARALLELISM
            };
            partitions.push(Partition {
                index,
                start,
                end,
                from_boundary,
                symbols,
            });
        }
        Ok(PartitionPlanner {
            zone,
            partitions,
            options,
        })
    }

    /// Returns the zone.
    pub fn zone(&self) -> &DomainName {
        &self.zone
    }

    /// Returns the planned partitions.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Returns the walker for a partition.
    pub fn walker<R>(&self, partition: &Partition, resolver: R) -> ZoneWalker<R> {
        let mut walker = ZoneWalker::new(
            NsecProbe::new(resolver, self.zone.clone()),
            partition.start.clone(),
            self.options,
        )
        .with_partition(partition.index);
        if let Some(end) = partition.end.as_ref() {
            walker = walker.with_upper_bound(end.clone());
        }
        if partition.from_boundary {
            walker = walker.inclusive();
        }
        walker
    }

    /// Walks all partitions concurrently.
    ///
    /// Every partition gets its own task. The names found are sent to
    /// `output`. Returns the summaries of all walks in partition order once
    /// all of them have ended.
    pub async fn run<R>(
        &self,
        resolver: R,
        output: mpsc::Sender<DomainName>,
        shutdown: CancellationToken,
    ) -> Vec<WalkSummary>
    where
        R: Resolver + Clone + 'static,
    {
        let mut set = JoinSet::new();
        for partition in &self.partitions {
            debug!(
                "partition {}: symbols {:?}",
                partition.index,
                partition.symbols
            );
            let walker = self.walker(partition, resolver.clone());
            set.spawn(walker.run(output.clone(), shutdown.clone()));
        }
        drop(output);

        let mut summaries = Vec::with_capacity(self.partitions.len());
        while let Some(res) = set.join_next().await {
            match res {
                Ok(summary) => summaries.push(summary),
                Err(err) => error!("walker task failed: {}", err),
            }
        }
        summaries.sort_by_key(|summary| summary.partition);
        summaries
    }
}

//============ Testing =======================================================
