//! Limiting the rate of walk steps.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

//------------ RateLimiter ---------------------------------------------------

/// Keeps successive steps of a walk a minimum interval apart.
///
/// The interval is measured from the start of one step to the start of the
/// next, so the time a step spends waiting for the resolver counts towards
/// it. Slow steps are therefore not slowed down further.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// The minimum time between the starts of two steps.
    ///
    /// If this is `None`, steps are not limited at all.
    interval: Option<Duration>,

    /// When the last step started.
    last_start: Option<Instant>,
}

impl RateLimiter {
    /// Creates a limiter allowing `rate` steps per second.
    ///
    /// A rate of zero disables limiting.
    pub fn new(rate: u32) -> Self {
        RateLimiter {
            interval: (rate > 0).then(|| Duration::from_secs(1) / rate),
            last_start: None,
        }
    }

    /// Returns the minimum interval between steps.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Waits until the next step may start and records its start.
    pub async fn wait(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_start)
        {
            sleep_until(last + interval).await;
        }
        self.last_start = Some(Instant::now());
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn spaces_steps() {
        let mut limiter = RateLimiter::new(10);
        assert_eq!(limiter.interval(), Some(Duration::from_millis(100)));
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(Instant::now(), start);
        limiter.wait().await;
        assert_eq!(Instant::now() - start, Duration::from_millis(100));
        limiter.wait().await;
        assert_eq!(Instant::now() - start, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_steps_are_not_delayed() {
        let mut limiter = RateLimiter::new(10);
        limiter.wait().await;
        sleep(Duration::from_millis(70)).await;
        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(Instant::now() - before, Duration::from_millis(30));

        sleep(Duration::from_millis(250)).await;
        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits() {
        let mut limiter = RateLimiter::new(0);
        assert_eq!(limiter.interval(), None);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait().await;
        }
        assert_eq!(Instant::now(), start);
    }
}
