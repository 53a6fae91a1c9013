//! Retrying failed operations with exponential backoff.
//!
//! A zone walk can run for hours and every single step depends on the one
//! before. Giving up because of a lost packet or an overloaded server is not
//! an option, so transient failures are retried for as long as it takes,
//! waiting a little longer after each consecutive failure. Only a shutdown
//! or a failure that no amount of retrying will fix ends the operation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ProbeError;

//------------ Transient -----------------------------------------------------

/// An error that knows whether it is worth retrying.
pub trait Transient: fmt::Display {
    /// Returns whether the failed operation may succeed if repeated.
    fn is_transient(&self) -> bool;
}

impl Transient for ProbeError {
    fn is_transient(&self) -> bool {
        ProbeError::is_transient(self)
    }
}

//------------ Backoff -------------------------------------------------------

/// The delays between retries.
///
/// The first retry happens after the initial delay. Each further failure
/// multiplies the delay by the backoff factor until it reaches the maximum
/// delay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl Backoff {
    /// The default factor the delay grows by.
    pub const DEFAULT_FACTOR: f64 = 1.5;

    /// Creates a new backoff with the default factor.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            initial,
            max,
            factor: Self::DEFAULT_FACTOR,
        }
    }

    /// Returns the delay before the first retry.
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Returns the maximum delay.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Returns the delay after `failures` earlier consecutive failures.
    ///
    /// This is `min(initial * factor^failures, max)`.
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = i32::try_from(failures).unwrap_or(i32::MAX);
        self.scale(self.initial, self.factor.powi(exp))
    }

    /// Returns the delay following `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        self.scale(current, self.factor)
    }

    fn scale(&self, delay: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

//------------ RetryError ----------------------------------------------------

/// Why a retried operation did not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed in a way retrying can’t fix.
    Fatal(E),

    /// A shutdown was requested.
    Cancelled,
}

//------------ RetryPolicy ---------------------------------------------------

/// Runs operations until they succeed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RetryPolicy {
    backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a new policy using the given backoff.
    pub fn new(backoff: Backoff) -> Self {
        RetryPolicy { backoff }
    }

    /// Returns the backoff of the policy.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Runs `operation` until it succeeds.
    ///
    /// Transient errors are logged and the operation is started again
    /// after waiting for `delay`, which then grows for the next round.
    /// Once the operation succeeds, `delay` is reset to the initial delay.
    /// There is no limit on the number of attempts.
    ///
    /// The operation and all waiting are abandoned as soon as `shutdown` is
    /// cancelled.
    pub async fn run<T, E, F, Fut>(
        &self,
        shutdown: &CancellationToken,
        delay: &mut Duration,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Transient,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            let res = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
                res = operation() => res,
            };
            let err = match res {
                Ok(value) => {
                    *delay = self.backoff.initial;
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    return Err(RetryError::Fatal(err))
                }
                Err(err) => err,
            };
            if shutdown.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            warn!("{}; retrying in {:?}", err, delay);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
                _ = sleep(*delay) => {}
            }
            *delay = self.backoff.next_delay(*delay);
        }
    }
}

//============ Testing =======================================================
