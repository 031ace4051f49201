//! The final report of a load test run.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytesize::ByteSize;
use serde::Serialize;
use yansi::Paint;

use crate::error::{Error, Result};
use crate::request::Operation;
use crate::statistics::{Latency, OperationSnapshot, Snapshot};
use crate::stop::StopReason;

/// Summary of a completed run.
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    /// Start of the run in milliseconds since the Unix epoch.
    pub timestamp_start: u64,
    /// End of the run in milliseconds since the Unix epoch.
    pub timestamp_finish: u64,
    /// Duration of the run in seconds.
    pub runtime: f64,
    /// Why the run stopped.
    pub exit_reason: String,
    /// Requests still in flight when the drain timed out.
    pub abandoned: usize,
    /// Protocol violations detected during the run.
    pub violations: u64,
    /// Counters across all operations.
    pub total: OperationSummary,
    /// Counters per operation that completed at least once.
    pub operations: BTreeMap<Operation, OperationSummary>,
}

/// Counters of a single operation, or of all operations.
#[derive(Clone, Debug, Serialize)]
pub struct OperationSummary {
    /// Number of completed requests.
    pub operations: u64,
    /// Number of body bytes transferred.
    pub bytes: u64,
    /// Number of responses per status code.
    pub status_codes: BTreeMap<u16, u64>,
    /// Request latencies.
    pub latency: LatencySummary,
}

impl OperationSummary {
    /// Number of responses with a status code outside of `2xx`.
    pub fn failures(&self) -> u64 {
        self.status_codes
            .iter()
            .filter(|(status, _)| !(200..300).contains(*status))
            .map(|(_, count)| count)
            .sum()
    }
}

impl From<OperationSnapshot> for OperationSummary {
    fn from(snapshot: OperationSnapshot) -> Self {
        Self {
            operations: snapshot.operations,
            bytes: snapshot.bytes,
            status_codes: snapshot.status_codes,
            latency: LatencySummary::from(&snapshot.latency),
        }
    }
}

/// Latency percentiles in seconds.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct LatencySummary {
    /// Mean latency.
    pub mean: Option<f64>,
    /// Median latency.
    pub p50: Option<f64>,
    /// 90th percentile.
    pub p90: Option<f64>,
    /// 99th percentile.
    pub p99: Option<f64>,
}

impl From<&Latency> for LatencySummary {
    fn from(latency: &Latency) -> Self {
        let seconds = |duration: Option<Duration>| duration.map(|d| d.as_secs_f64());
        Self {
            mean: seconds(latency.mean()),
            p50: seconds(latency.quantile(0.5)),
            p90: seconds(latency.quantile(0.9)),
            p99: seconds(latency.quantile(0.99)),
        }
    }
}

fn epoch_millis(time: SystemTime) -> Result<u64> {
    let since_epoch = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::invalid("timestamp before the Unix epoch"))?;
    u64::try_from(since_epoch.as_millis()).map_err(|_| Error::invalid("timestamp out of range"))
}

impl Summary {
    /// Creates a summary of a run between `start` and `finish`.
    ///
    /// Fails if either timestamp precedes the Unix epoch or the run finished before it started.
    pub fn new(
        start: SystemTime,
        finish: SystemTime,
        snapshot: Snapshot,
        exit_reason: Option<&StopReason>,
        abandoned: usize,
        violations: u64,
    ) -> Result<Self> {
        let timestamp_start = epoch_millis(start)?;
        let timestamp_finish = epoch_millis(finish)?;
        let runtime = finish
            .duration_since(start)
            .map_err(|_| Error::invalid("run finished before it started"))?;

        Ok(Self {
            timestamp_start,
            timestamp_finish,
            runtime: runtime.as_secs_f64(),
            exit_reason: exit_reason.map_or_else(|| "completed".to_owned(), ToString::to_string),
            abandoned,
            violations,
            total: snapshot.total.into(),
            operations: snapshot
                .operations
                .into_iter()
                .map(|(operation, snapshot)| (operation, snapshot.into()))
                .collect(),
        })
    }

    /// Writes the summary as JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|err| Error::io(format!("creating {}", path.display()), err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|err| Error::io("serializing summary", err.into()))?;
        writer
            .flush()
            .map_err(|err| Error::io(format!("writing {}", path.display()), err))
    }

    /// Prints the summary to stdout.
    pub fn print(&self) {
        let runtime = Duration::from_secs_f64(self.runtime);

        println!();
        println!(
            "{} (runtime: {:.2?}, stopped: {})",
            "## Summary".bold(),
            runtime.bold(),
            self.exit_reason.blue()
        );
        if self.abandoned > 0 {
            println!(
                "{}",
                format!("{} ABANDONED REQUESTS", self.abandoned).bold().red()
            );
        }
        if self.violations > 0 {
            println!(
                "{}",
                format!("{} PROTOCOL VIOLATIONS", self.violations)
                    .bold()
                    .red()
            );
        }

        for (operation, summary) in &self.operations {
            let label = format!("{}:", operation.as_str().to_uppercase());
            print_operation(&label, summary, runtime);
        }

        println!();
        print_operation("TOTAL:", &self.total, runtime);
    }
}

fn print_operation(label: &str, summary: &OperationSummary, runtime: Duration) {
    print!("{} ({} ops", label.bold().green(), summary.operations.bold());
    let failures = summary.failures();
    if failures > 0 {
        print!(", {}", format!("{failures} FAILURES").bold().red());
    }
    println!(")");

    let seconds = runtime.as_secs_f64().max(f64::EPSILON);
    let ops_ps = summary.operations as f64 / seconds;
    let throughput = ByteSize::b((summary.bytes as f64 / seconds) as u64);
    println!(
        "  {:.2} operations/s, {:.2}/s ({} total)",
        ops_ps.bold(),
        throughput.bold(),
        ByteSize::b(summary.bytes)
    );

    let latency = summary.latency;
    if let Some(mean) = latency.mean {
        let map = |seconds: Option<f64>| seconds.map(Duration::from_secs_f64).unwrap_or_default();
        let (p50, p90, p99) = (map(latency.p50), map(latency.p90), map(latency.p99));
        println!(
            "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
            Duration::from_secs_f64(mean).bold()
        );
    }

    let codes: Vec<_> = summary
        .status_codes
        .iter()
        .map(|(status, count)| format!("{status}={count}"))
        .collect();
    println!("  status codes: {}", codes.join(", "));
}
