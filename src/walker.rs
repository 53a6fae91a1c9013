//! Walking a zone, or a slice of one.
//!
//! A [`ZoneWalker`] starts at some name of a zone and keeps asking for the
//! next name until the NSEC chain wraps around to the apex, until it leaves
//! the zone, or until it reaches an upper bound set for it. Every name found
//! on the way is sent to an output channel, in canonical order.
//!
//! Each step is rate limited by a [`RateLimiter`] and retried by a
//! [`RetryPolicy`] until it succeeds. A walk thus only ends early if the zone
//! turns out to be unwalkable, if it is cancelled, or if nobody listens to
//! its output anymore.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{NameError, ProbeError};
use crate::name::DomainName;
use crate::probe::{NsecProbe, ProbeResult};
use crate::rate::RateLimiter;
use crate::resolver::Resolver;
use crate::retry::{Backoff, RetryError, RetryPolicy};

//------------ WalkOptions ---------------------------------------------------

/// The knobs of a walk that are the same for all partitions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WalkOptions {
    /// The maximum number of steps per second and walker.
    ///
    /// Zero means unlimited.
    pub rate: u32,

    /// The delays between retries of a failed step.
    pub backoff: Backoff,
}

impl WalkOptions {
    /// The default rate.
    pub const DEFAULT_RATE: u32 = 10;
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            rate: Self::DEFAULT_RATE,
            backoff: Backoff::default(),
        }
    }
}

//------------ WalkCursor ----------------------------------------------------

/// Where a walk currently is.
#[derive(Clone, Debug)]
pub struct WalkCursor {
    /// The last name confirmed to exist, or the start name.
    pub current: DomainName,

    /// The zone being walked.
    pub suffix: DomainName,

    /// The first name that belongs to somebody else.
    pub upper_bound: Option<DomainName>,

    /// How long to wait after the next failure.
    pub failure_delay: Duration,

    /// Whether `current` itself still needs to be looked for.
    ///
    /// This is the case for the start of a partition: the start name may
    /// well exist and then it belongs to this partition.
    pub inclusive: bool,
}

//------------ EndReason -----------------------------------------------------

/// Why a walk ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EndReason {
    /// The NSEC chain wrapped around to the apex.
    Wrapped,

    /// The next name belongs to the following partition.
    Boundary(DomainName),

    /// The next name is not part of the zone.
    OutsideZone(DomainName),

    /// The zone cannot be walked securely.
    Unsecured,

    /// No further probe name could be derived.
    NameSpaceExhausted,

    /// The name to ask for next cannot be represented.
    InvalidName(NameError),

    /// A query failed in a way that retrying can’t fix.
    Failed(String),

    /// The walk was cancelled.
    Cancelled,

    /// Nobody is listening to the walk’s output anymore.
    OutputClosed,
}

impl EndReason {
    /// Returns whether the walk covered everything it was supposed to.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            EndReason::Wrapped
                | EndReason::Boundary(_)
                | EndReason::OutsideZone(_)
        )
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EndReason::Wrapped => f.write_str("end of zone reached"),
            EndReason::Boundary(name) => {
                write!(f, "reached partition boundary at {}", name)
            }
            EndReason::OutsideZone(name) => {
                write!(f, "next name {} is outside the zone", name)
            }
            EndReason::Unsecured => f.write_str("zone is not DNSSEC-secure"),
            EndReason::NameSpaceExhausted => {
                f.write_str("no further probe name possible")
            }
            EndReason::InvalidName(err) => {
                write!(f, "cannot derive next query name: {}", err)
            }
            EndReason::Failed(err) => write!(f, "giving up: {}", err),
            EndReason::Cancelled => f.write_str("cancelled"),
            EndReason::OutputClosed => f.write_str("output closed"),
        }
    }
}

//------------ WalkState -----------------------------------------------------

/// The state of a walker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WalkState {
    /// The walker is still going.
    Running,

    /// The walker has stopped for good.
    Ended(EndReason),
}

//------------ WalkSummary ---------------------------------------------------

/// What a finished walk did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalkSummary {
    /// The index of the walked partition.
    pub partition: usize,

    /// The number of names sent to the output.
    pub names: u64,

    /// The number of queries sent, including retries.
    pub queries: u64,

    /// Why the walk ended.
    pub reason: EndReason,
}

//------------ ZoneWalker ----------------------------------------------------

/// Walks a zone or a part of it.
#[derive(Debug)]
pub struct ZoneWalker<R> {
    partition: usize,
    probe: NsecProbe<R>,
    retry: RetryPolicy,
    limiter: RateLimiter,
    cursor: WalkCursor,
    state: WalkState,
    names: u64,
    queries: u64,
}

impl<R> ZoneWalker<R> {
    /// Creates a walker starting right after `start`.
    ///
    /// The walker stays within the zone of the probe. `start` itself is
    /// never reported, use [`inclusive`][Self::inclusive] for that.
    pub fn new(
        probe: NsecProbe<R>,
        start: DomainName,
        options: WalkOptions,
    ) -> Self {
        let retry = RetryPolicy::new(options.backoff);
        ZoneWalker {
            partition: 0,
            cursor: WalkCursor {
                current: start,
                suffix: probe.apex().clone(),
                upper_bound: None,
                failure_delay: retry.backoff().initial(),
                inclusive: false,
            },
            probe,
            retry,
            limiter: RateLimiter::new(options.rate),
            state: WalkState::Running,
            names: 0,
            queries: 0,
        }
    }

    /// Sets the index of the partition walked.
    pub fn with_partition(mut self, partition: usize) -> Self {
        self.partition = partition;
        self
    }

    /// Stops the walk before `bound`.
    pub fn with_upper_bound(mut self, bound: DomainName) -> Self {
        self.cursor.upper_bound = Some(bound);
        self
    }

    /// Makes the start name part of the walk if it exists.
    pub fn inclusive(mut self) -> Self {
        self.cursor.inclusive = true;
        self
    }

    /// Returns the cursor.
    pub fn cursor(&self) -> &WalkCursor {
        &self.cursor
    }

    /// Returns the state.
    pub fn state(&self) -> &WalkState {
        &self.state
    }

    /// Returns the summary of the walk so far.
    ///
    /// A walk that hasn’t ended yet is reported as cancelled.
    pub fn summary(&self) -> WalkSummary {
        WalkSummary {
            partition: self.partition,
            names: self.names,
            queries: self.queries,
            reason: match &self.state {
                WalkState::Ended(reason) => reason.clone(),
                WalkState::Running => EndReason::Cancelled,
            },
        }
    }

    fn end(&mut self, reason: EndReason) {
        if reason.is_complete() {
            info!("partition {}: {}", self.partition, reason);
        } else if reason != EndReason::Cancelled {
            error!("partition {}: {}", self.partition, reason);
        }
        self.state = WalkState::Ended(reason);
    }
}

impl<R: Resolver> ZoneWalker<R> {
    /// Takes one step and returns the name found.
    ///
    /// Returns `None` once the walk has ended. The reason can then be found
    /// in the walker’s [state][Self::state].
    pub async fn step(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Option<DomainName> {
        if self.state != WalkState::Running {
            return None;
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                self.end(EndReason::Cancelled);
                return None;
            }
            _ = self.limiter.wait() => {}
        }

        let inclusive = self.cursor.inclusive;
        let current = &self.cursor.current;
        let probe = &self.probe;
        let queries = &mut self.queries;
        let res = self
            .retry
            .run(shutdown, &mut self.cursor.failure_delay, move || {
                *queries += 1;
                async move {
                    if inclusive {
                        probe.seek(current).await
                    } else {
                        probe.probe(current).await
                    }
                }
            })
            .await;

        let next = match res {
            Ok(ProbeResult::Next(next)) => next,
            Ok(ProbeResult::Wrapped) => {
                self.end(EndReason::Wrapped);
                return None;
            }
            Err(RetryError::Cancelled) => {
                self.end(EndReason::Cancelled);
                return None;
            }
            Err(RetryError::Fatal(ProbeError::Unsecured)) => {
                self.end(EndReason::Unsecured);
                return None;
            }
            Err(RetryError::Fatal(ProbeError::Name(NameError::Exhausted))) => {
                self.end(EndReason::NameSpaceExhausted);
                return None;
            }
            Err(RetryError::Fatal(ProbeError::Name(err))) => {
                self.end(EndReason::InvalidName(err));
                return None;
            }
            Err(RetryError::Fatal(err)) => {
                self.end(EndReason::Failed(err.to_string()));
                return None;
            }
        };
        self.cursor.inclusive = false;

        if let Some(bound) = self.cursor.upper_bound.as_ref() {
            if next >= *bound {
                self.end(EndReason::Boundary(next));
                return None;
            }
        }
        if !next.ends_with(&self.cursor.suffix) {
            self.end(EndReason::OutsideZone(next));
            return None;
        }

        debug!("partition {}: found {}", self.partition, next);
        self.cursor.current = next.clone();
        self.names += 1;
        Some(next)
    }

    /// Walks until the end and sends every name found to `output`.
    pub async fn run(
        mut self,
        output: mpsc::Sender<DomainName>,
        shutdown: CancellationToken,
    ) -> WalkSummary {
        info!(
            "partition {}: walking from {}{}",
            self.partition,
            self.cursor.current.fmt_with_dot(),
            match self.cursor.upper_bound.as_ref() {
                Some(bound) => format!(" up to {}", bound.fmt_with_dot()),
                None => String::new(),
            }
        );
        while let Some(name) = self.step(&shutdown).await {
            let sent = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.end(EndReason::Cancelled);
                    break;
                }
                sent = output.send(name) => sent,
            };
            if sent.is_err() {
                self.end(EndReason::OutputClosed);
                break;
            }
        }
        self.summary()
    }
}

//============ Testing =======================================================
