//! Admission control for the operation loop.
//!
//! A [`Scheduler`] either paces admissions to a target rate or bounds the number of requests in
//! flight. Both policies share the same contract: [`Scheduler::wait_for_next`] resolves once the
//! next request may be admitted, and [`Scheduler::complete`] is called once for every admitted
//! request after it finished. Pending waits resolve with [`Cancelled`] as soon as the
//! cancellation token passed at construction is triggered.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Returned by [`Scheduler::wait_for_next`] when the run is stopping.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("scheduler cancelled")]
pub struct Cancelled;

/// Admission policy of a load test.
#[derive(Debug)]
pub enum Scheduler {
    /// Paces admissions to a target rate.
    Rate(RateScheduler),
    /// Bounds the number of requests in flight.
    Concurrency(ConcurrencyScheduler),
}

impl Scheduler {
    /// Creates a rate scheduler, see [`RateScheduler::new`].
    pub fn rate(
        rate: f64,
        floor: f64,
        ramp_up: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        RateScheduler::new(rate, floor, ramp_up, cancel).map(Self::Rate)
    }

    /// Creates a concurrency scheduler, see [`ConcurrencyScheduler::new`].
    pub fn concurrency(max: usize, ramp_up: Duration, cancel: CancellationToken) -> Result<Self> {
        ConcurrencyScheduler::new(max, ramp_up, cancel).map(Self::Concurrency)
    }

    /// Waits until the next request may be admitted.
    pub async fn wait_for_next(&self) -> Result<(), Cancelled> {
        match self {
            Scheduler::Rate(scheduler) => scheduler.wait_for_next().await,
            Scheduler::Concurrency(scheduler) => scheduler.wait_for_next().await,
        }
    }

    /// Signals that a previously admitted request finished.
    pub fn complete(&self) {
        match self {
            // Pacing does not depend on the number of requests in flight.
            Scheduler::Rate(_) => (),
            Scheduler::Concurrency(scheduler) => scheduler.complete(),
        }
    }

    /// Drives the ramp-up of the concurrency limit.
    ///
    /// Resolves once the limit reached its maximum or the run was cancelled. Rate schedulers
    /// compute their ramp-up from the admission count and return immediately.
    pub async fn run_ramp(&self) {
        match self {
            Scheduler::Rate(_) => (),
            Scheduler::Concurrency(scheduler) => scheduler.run_ramp().await,
        }
    }
}

/// Admits requests at a target rate with an optional linear ramp-up.
///
/// The deadline of the n-th admission is computed from the start of the run, so pacing does not
/// drift with the accuracy of individual sleeps. During ramp-up, the effective rate grows linearly
/// from `floor` to `rate`.
#[derive(Debug)]
pub struct RateScheduler {
    rate: f64,
    floor: f64,
    ramp_up: Duration,
    start: OnceLock<Instant>,
    admitted: AtomicU64,
    cancel: CancellationToken,
}

impl RateScheduler {
    /// Creates a scheduler admitting `rate` requests per second.
    ///
    /// `floor` is the rate at the beginning of the ramp-up and must not exceed `rate`.
    pub fn new(
        rate: f64,
        floor: f64,
        ramp_up: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(Error::invalid(format!("rate must be > 0.0 [{rate}]")));
        }
        if !(0.0..=rate).contains(&floor) {
            return Err(Error::invalid(format!(
                "ramp-up floor must be in [0.0, {rate}] [{floor}]"
            )));
        }

        Ok(Self {
            rate,
            floor,
            ramp_up,
            start: OnceLock::new(),
            admitted: AtomicU64::new(0),
            cancel,
        })
    }

    /// Target rate in requests per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Time from the start of the run until the admission with index `n`.
    fn offset(&self, n: u64) -> Option<Duration> {
        let n = n as f64;
        let ramp = self.ramp_up.as_secs_f64();
        let slope = (self.rate - self.floor) / ramp;

        let seconds = if ramp == 0.0 || !slope.is_normal() {
            n / self.rate
        } else {
            let ramp_ops = (self.floor + self.rate) / 2.0 * ramp;
            if n < ramp_ops {
                // Invert `floor * t + slope * t^2 / 2 = n`.
                (-self.floor + (self.floor * self.floor + 2.0 * slope * n).sqrt()) / slope
            } else {
                ramp + (n - ramp_ops) / self.rate
            }
        };

        Duration::try_from_secs_f64(seconds).ok()
    }

    async fn wait_for_next(&self) -> Result<(), Cancelled> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let start = *self.start.get_or_init(Instant::now);
        let n = self.admitted.fetch_add(1, Ordering::Relaxed);
        let deadline = self.offset(n).and_then(|offset| start.checked_add(offset));

        let Some(deadline) = deadline else {
            self.cancel.cancelled().await;
            return Err(Cancelled);
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep_until(deadline) => Ok(()),
        }
    }
}

/// Admits requests while fewer than a maximum are in flight.
///
/// With a ramp-up, the limit starts at one and grows linearly to the maximum while
/// [`run_ramp`](Self::run_ramp) is being polled.
#[derive(Debug)]
pub struct ConcurrencyScheduler {
    semaphore: Semaphore,
    max: usize,
    outstanding: AtomicUsize,
    ramp_up: Duration,
    cancel: CancellationToken,
}

impl ConcurrencyScheduler {
    /// Creates a scheduler allowing at most `max` requests in flight.
    pub fn new(max: usize, ramp_up: Duration, cancel: CancellationToken) -> Result<Self> {
        if max == 0 || max > Semaphore::MAX_PERMITS {
            return Err(Error::invalid(format!(
                "concurrency must be in [1, {}] [{max}]",
                Semaphore::MAX_PERMITS
            )));
        }

        let initial = if ramp_up.is_zero() { max } else { 1 };
        Ok(Self {
            semaphore: Semaphore::new(initial),
            max,
            outstanding: AtomicUsize::new(0),
            ramp_up,
            cancel,
        })
    }

    /// Number of admitted requests that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    async fn wait_for_next(&self) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            permit = self.semaphore.acquire() => {
                // The semaphore is never closed.
                let permit = permit.map_err(|_| Cancelled)?;
                permit.forget();
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    fn complete(&self) {
        let decremented =
            self.outstanding
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match decremented {
            Ok(_) => self.semaphore.add_permits(1),
            Err(_) => tracing::warn!("scheduler completion without a matching admission"),
        }
    }

    async fn run_ramp(&self) {
        if self.ramp_up.is_zero() || self.max == 1 {
            return;
        }

        let start = Instant::now();
        let steps = (self.max - 1) as u32;
        for step in 1..=steps {
            let deadline = start + self.ramp_up.mul_f64(f64::from(step) / f64::from(steps));
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => self.semaphore.add_permits(1),
            }
        }

        tracing::debug!(max = self.max, "concurrency ramp-up complete");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn assert_close(actual: Duration, expected: Duration, tolerance: f64) {
        let actual = actual.as_secs_f64();
        let expected = expected.as_secs_f64();
        assert!(
            (actual - expected).abs() <= expected * tolerance,
            "elapsed {actual}s, expected {expected}s"
        );
    }

    async fn admit(scheduler: &Scheduler, count: usize) -> Duration {
        let start = Instant::now();
        for _ in 0..count {
            scheduler.wait_for_next().await.unwrap();
            scheduler.complete();
        }
        start.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn rate_thousand_per_second() {
        let scheduler =
            Scheduler::rate(1000.0, 0.0, Duration::ZERO, CancellationToken::new()).unwrap();
        let elapsed = admit(&scheduler, 60_000).await;
        assert_close(elapsed, Duration::from_secs(60), 0.05);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_ten_per_second() {
        let scheduler =
            Scheduler::rate(10.0, 0.0, Duration::ZERO, CancellationToken::new()).unwrap();
        let elapsed = admit(&scheduler, 100).await;
        assert_close(elapsed, Duration::from_secs(10), 0.05);
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_up_slows_start() {
        // Half of the ramp's 10s worth of operations at full rate: 500 ops, then 500 more in 5s.
        let scheduler = Scheduler::rate(
            100.0,
            0.0,
            Duration::from_secs(10),
            CancellationToken::new(),
        )
        .unwrap();
        let elapsed = admit(&scheduler, 1000).await;
        assert_close(elapsed, Duration::from_secs(15), 0.01);
    }

    #[test]
    fn ramp_offsets() {
        let cancel = CancellationToken::new();
        let ramp = Duration::from_secs(10);

        let scheduler = RateScheduler::new(100.0, 0.0, ramp, cancel.clone()).unwrap();
        assert_eq!(scheduler.offset(0), Some(Duration::ZERO));
        assert_close(scheduler.offset(500).unwrap(), ramp, 1e-9);
        assert_close(scheduler.offset(600).unwrap(), Duration::from_secs(11), 1e-9);

        let scheduler = RateScheduler::new(100.0, 50.0, ramp, cancel.clone()).unwrap();
        assert_close(scheduler.offset(750).unwrap(), ramp, 1e-9);

        // A floor equal to the rate makes the ramp-up a no-op.
        let scheduler = RateScheduler::new(100.0, 100.0, ramp, cancel).unwrap();
        assert_close(scheduler.offset(100).unwrap(), Duration::from_secs(1), 1e-9);
    }

    #[test]
    fn rejects_invalid_rates() {
        let cancel = CancellationToken::new;
        assert!(Scheduler::rate(0.0, 0.0, Duration::ZERO, cancel()).is_err());
        assert!(Scheduler::rate(-1.0, 0.0, Duration::ZERO, cancel()).is_err());
        assert!(Scheduler::rate(10.0, 20.0, Duration::ZERO, cancel()).is_err());
        assert!(Scheduler::concurrency(0, Duration::ZERO, cancel()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_cancellation_is_prompt() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::rate(0.001, 0.0, Duration::ZERO, cancel.clone()).unwrap();
        scheduler.wait_for_next().await.unwrap();

        let mut next = Box::pin(scheduler.wait_for_next());
        assert!(futures::poll!(&mut next).is_pending());

        cancel.cancel();
        assert_eq!(futures::poll!(&mut next), std::task::Poll::Ready(Err(Cancelled)));
        assert_eq!(scheduler.wait_for_next().await, Err(Cancelled));
    }

    #[tokio::test]
    async fn concurrency_blocks_at_max() {
        let scheduler =
            Scheduler::concurrency(2, Duration::ZERO, CancellationToken::new()).unwrap();
        scheduler.wait_for_next().await.unwrap();
        scheduler.wait_for_next().await.unwrap();

        let mut next = Box::pin(scheduler.wait_for_next());
        assert!(futures::poll!(&mut next).is_pending());

        scheduler.complete();
        assert!(futures::poll!(&mut next).is_ready());
    }

    #[tokio::test]
    async fn concurrency_cancellation_is_prompt() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::concurrency(1, Duration::ZERO, cancel.clone()).unwrap();
        scheduler.wait_for_next().await.unwrap();

        let mut next = Box::pin(scheduler.wait_for_next());
        assert!(futures::poll!(&mut next).is_pending());

        cancel.cancel();
        assert_eq!(next.await, Err(Cancelled));
    }

    #[tokio::test]
    async fn unmatched_complete_is_ignored() {
        let scheduler =
            Scheduler::concurrency(1, Duration::ZERO, CancellationToken::new()).unwrap();
        scheduler.complete();

        scheduler.wait_for_next().await.unwrap();
        let mut next = Box::pin(scheduler.wait_for_next());
        assert!(futures::poll!(&mut next).is_pending());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_max() {
        const MAX: usize = 5;

        let scheduler = Arc::new(
            ConcurrencyScheduler::new(MAX, Duration::ZERO, CancellationToken::new()).unwrap(),
        );
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        scheduler.wait_for_next().await.unwrap();
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        assert!(scheduler.in_flight() <= MAX);
                        tokio::task::yield_now().await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        scheduler.complete();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= MAX);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_ramps_up() {
        let scheduler =
            Scheduler::concurrency(3, Duration::from_secs(10), CancellationToken::new()).unwrap();
        scheduler.wait_for_next().await.unwrap();

        let mut second = Box::pin(scheduler.wait_for_next());
        assert!(futures::poll!(&mut second).is_pending());

        let mut ramp = Box::pin(scheduler.run_ramp());
        tokio::select! {
            _ = &mut ramp => unreachable!("ramp lasts 10s"),
            _ = tokio::time::sleep(Duration::from_secs(6)) => {}
        }
        assert!(futures::poll!(&mut second).is_ready());

        let mut third = Box::pin(scheduler.wait_for_next());
        assert!(futures::poll!(&mut third).is_pending());

        ramp.await;
        assert!(futures::poll!(&mut third).is_ready());
    }
}
