//! Counters aggregated across all completed requests.
//!
//! [`Statistics`] keeps one set of counters per [`Operation`] plus an aggregate. Updates are
//! lock-free except for the latency sketch, and every update synchronously evaluates the
//! configured [`Threshold`]s so that a run stops on the very request that crosses one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::error::{Error, Result};
use crate::request::{Operation, Request, Response};
use crate::stop::{StopReason, StopSignal};

/// Status codes at or above this value are counted, but not tracked individually.
const MAX_STATUS: usize = 1000;

/// A counter tracked per operation and in aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Number of completed requests.
    Operations,
    /// Number of body bytes transferred.
    Bytes,
    /// Number of responses with the given status code.
    Status(u16),
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Counter::Operations => f.write_str("operations"),
            Counter::Bytes => f.write_str("bytes"),
            Counter::Status(status) => write!(f, "status {status}"),
        }
    }
}

/// Stops a run once a counter reaches a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Threshold {
    operation: Option<Operation>,
    counter: Counter,
    value: u64,
}

impl Threshold {
    /// Creates a threshold on the counter of `operation`, or of the aggregate if `None`.
    ///
    /// The value must be positive.
    pub fn new(operation: Option<Operation>, counter: Counter, value: u64) -> Result<Self> {
        if value == 0 {
            return Err(Error::invalid(format!("threshold for {counter} must be > 0")));
        }
        if let Counter::Status(status) = counter
            && usize::from(status) >= MAX_STATUS
        {
            return Err(Error::invalid(format!("status code out of range [{status}]")));
        }

        Ok(Self {
            operation,
            counter,
            value,
        })
    }

    fn applies_to(&self, operation: Operation) -> bool {
        self.operation.is_none_or(|op| op == operation)
    }

    fn reason(&self) -> StopReason {
        StopReason::Threshold {
            operation: self.operation,
            counter: self.counter,
            value: self.value,
        }
    }
}

struct Counters {
    operations: AtomicU64,
    bytes: AtomicU64,
    statuses: Box<[AtomicU64]>,
    latency: Mutex<DDSketch>,
}

impl Counters {
    fn new() -> Self {
        Self {
            operations: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            statuses: (0..MAX_STATUS).map(|_| AtomicU64::new(0)).collect(),
            latency: Mutex::new(DDSketch::default()),
        }
    }

    fn record(&self, response: &Response, latency: Duration) {
        self.bytes.fetch_add(response.bytes(), Ordering::Relaxed);
        if let Some(status) = self.statuses.get(usize::from(response.status())) {
            status.fetch_add(1, Ordering::Relaxed);
        }
        self.latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add(latency.as_secs_f64());
        // Incremented last, so readers never see more operations than recorded bytes and codes.
        self.operations.fetch_add(1, Ordering::AcqRel);
    }

    fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Operations => self.operations.load(Ordering::Acquire),
            Counter::Bytes => self.bytes.load(Ordering::Relaxed),
            Counter::Status(status) => self
                .statuses
                .get(usize::from(status))
                .map_or(0, |count| count.load(Ordering::Relaxed)),
        }
    }

    fn snapshot(&self) -> OperationSnapshot {
        let operations = self.operations.load(Ordering::Acquire);
        let status_codes = self
            .statuses
            .iter()
            .enumerate()
            .filter_map(|(status, count)| {
                let count = count.load(Ordering::Relaxed);
                (count > 0).then_some((status as u16, count))
            })
            .collect();
        let latency = self
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        OperationSnapshot {
            operations,
            bytes: self.bytes.load(Ordering::Relaxed),
            status_codes,
            latency: Latency(latency),
        }
    }
}

/// Thread-safe counters of a load test run.
pub struct Statistics {
    total: Counters,
    operations: [Counters; Operation::ALL.len()],
    thresholds: Vec<Threshold>,
    stop: StopSignal,
}

impl Statistics {
    /// Creates empty statistics stopping `stop` once any of `thresholds` is reached.
    pub fn new(thresholds: Vec<Threshold>, stop: StopSignal) -> Self {
        Self {
            total: Counters::new(),
            operations: std::array::from_fn(|_| Counters::new()),
            thresholds,
            stop,
        }
    }

    /// Records a completed request and evaluates the thresholds.
    pub fn update(&self, request: &Request, response: &Response, latency: Duration) {
        let operation = request.operation();
        self.total.record(response, latency);
        self.operations[operation.index()].record(response, latency);

        for threshold in &self.thresholds {
            if !threshold.applies_to(operation) {
                continue;
            }
            if self.get(threshold.operation, threshold.counter) >= threshold.value {
                self.stop.stop(threshold.reason());
            }
        }
    }

    /// Current value of a counter for `operation`, or of the aggregate if `None`.
    pub fn get(&self, operation: Option<Operation>, counter: Counter) -> u64 {
        match operation {
            Some(operation) => self.operations[operation.index()].get(counter),
            None => self.total.get(counter),
        }
    }

    /// Copies all counters.
    pub fn snapshot(&self) -> Snapshot {
        let operations = Operation::ALL
            .into_iter()
            .map(|operation| (operation, self.operations[operation.index()].snapshot()))
            .filter(|(_, snapshot)| snapshot.operations > 0)
            .collect();

        Snapshot {
            total: self.total.snapshot(),
            operations,
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(Vec::new(), StopSignal::new())
    }
}

impl fmt::Debug for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statistics")
            .field("operations", &self.total.get(Counter::Operations))
            .field("bytes", &self.total.get(Counter::Bytes))
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of [`Statistics`].
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Counters across all operations.
    pub total: OperationSnapshot,
    /// Counters of each operation that completed at least once.
    pub operations: BTreeMap<Operation, OperationSnapshot>,
}

/// Point-in-time copy of the counters of one operation, or of the aggregate.
#[derive(Clone, Debug)]
pub struct OperationSnapshot {
    /// Number of completed requests.
    pub operations: u64,
    /// Number of body bytes transferred.
    pub bytes: u64,
    /// Number of responses per status code.
    pub status_codes: BTreeMap<u16, u64>,
    /// Distribution of request latencies.
    pub latency: Latency,
}

/// Latency distribution of completed requests.
#[derive(Clone)]
pub struct Latency(DDSketch);

impl Latency {
    /// Number of recorded latencies.
    pub fn count(&self) -> usize {
        self.0.count()
    }

    /// The mean latency, if any were recorded.
    pub fn mean(&self) -> Option<Duration> {
        let count = self.0.count();
        let sum = self.0.sum()?;
        (count > 0).then(|| Duration::from_secs_f64(sum / count as f64))
    }

    /// The latency at quantile `q` in `[0, 1]`, if any were recorded.
    pub fn quantile(&self, q: f64) -> Option<Duration> {
        self.0
            .quantile(q)
            .ok()
            .flatten()
            .map(|seconds| Duration::from_secs_f64(seconds.max(0.0)))
    }
}

impl fmt::Debug for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latency")
            .field("count", &self.count())
            .field("mean", &self.mean())
            .finish()
    }
}
