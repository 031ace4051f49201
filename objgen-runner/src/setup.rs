//! Creation of a load test from its configuration.
//!
//! Every value is validated while the engine components are created, so configuration errors
//! surface before any request is sent.

use std::sync::Arc;

use anyhow::{Context, Result};
use objgen_engine::client::Client;
use objgen_engine::distribution::Distribution;
use objgen_engine::load_test::{Checkpoint, Components, LoadTest, RunOptions};
use objgen_engine::manager::ObjectManager;
use objgen_engine::mix::RequestMix;
use objgen_engine::scheduler::Scheduler;
use objgen_engine::statistics::{Counter, Statistics, Threshold};
use objgen_engine::stop::StopSignal;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, CounterKind, FileSize, SchedulerConfig, StoppingConditions};

/// Creates the scheduler, cancelled by `cancel`.
pub fn scheduler(config: &SchedulerConfig, cancel: CancellationToken) -> Result<Scheduler> {
    let scheduler = match *config {
        SchedulerConfig::Rate {
            rate,
            unit,
            ramp_up,
            floor,
        } => Scheduler::rate(unit.per_second(rate), unit.per_second(floor), ramp_up, cancel),
        SchedulerConfig::Concurrency { count, ramp_up } => {
            Scheduler::concurrency(count, ramp_up, cancel)
        }
    };

    scheduler.context("invalid scheduler configuration")
}

fn distribution(filesize: &FileSize) -> Result<Distribution> {
    Distribution::new(
        filesize.distribution,
        filesize.average.as_u64() as f64,
        filesize.spread.as_u64() as f64,
    )
    .with_context(|| format!("invalid filesize {:?}", filesize.distribution))
}

/// Creates the request mix from the operation weights and size profiles.
pub fn request_mix(config: &Config) -> Result<RequestMix> {
    let mut builder = RequestMix::builder()
        .operation_weights(config.operations)
        .data(config.data);

    for filesize in &config.filesizes {
        builder = builder.size_profile(distribution(filesize)?, filesize.weight);
    }
    if let Some(seed) = config.seed {
        builder = builder.seed(seed);
    }

    builder.build().context("invalid operation mix")
}

/// Converts the stopping conditions into statistics thresholds.
///
/// The runtime limit is not a threshold, see [`run_options`].
pub fn thresholds(conditions: &StoppingConditions) -> Result<Vec<Threshold>> {
    let mut thresholds = Vec::new();

    if let Some(operations) = conditions.operations {
        thresholds.push(
            Threshold::new(None, Counter::Operations, operations)
                .context("invalid operations stopping condition")?,
        );
    }

    for (status, &count) in &conditions.status_codes {
        let status: u16 = status
            .parse()
            .with_context(|| format!("invalid status code {status:?}"))?;
        thresholds.push(
            Threshold::new(None, Counter::Status(status), count)
                .context("invalid status code stopping condition")?,
        );
    }

    for threshold in &conditions.thresholds {
        let counter = match (threshold.counter, threshold.status) {
            (CounterKind::Operations, None) => Counter::Operations,
            (CounterKind::Bytes, None) => Counter::Bytes,
            (CounterKind::Status, Some(status)) => Counter::Status(status),
            (CounterKind::Status, None) => anyhow::bail!("status threshold requires a status"),
            (_, Some(_)) => anyhow::bail!("only status thresholds take a status"),
        };
        thresholds.push(
            Threshold::new(threshold.operation, counter, threshold.value)
                .context("invalid threshold")?,
        );
    }

    Ok(thresholds)
}

/// Loads the object pool, or creates an empty one if no path is configured.
pub fn object_manager(config: &Config) -> Result<ObjectManager> {
    match &config.object_manager.path {
        Some(path) => ObjectManager::load(path)
            .with_context(|| format!("failed to load object pool from {}", path.display())),
        None => Ok(ObjectManager::new()),
    }
}

/// Options of the run.
pub fn run_options(config: &Config) -> RunOptions {
    let checkpoint = config
        .object_manager
        .path
        .clone()
        .map(|path| Checkpoint {
            path,
            interval: config.object_manager.checkpoint_interval,
        });

    RunOptions {
        workers: config.runtime.workers,
        runtime: config.stopping_conditions.runtime,
        drain_timeout: config.client.drain_timeout,
        strict: config.client.strict,
        checkpoint,
    }
}

/// Creates a load test sending requests through `client`.
pub fn load_test(config: &Config, client: Arc<dyn Client>) -> Result<LoadTest> {
    let stop = StopSignal::new();

    let components = Components {
        scheduler: scheduler(&config.scheduler, stop.token().clone())?,
        mix: request_mix(config)?,
        objects: object_manager(config)?,
        statistics: Statistics::new(thresholds(&config.stopping_conditions)?, stop.clone()),
        client,
        stop,
    };

    LoadTest::new(components, run_options(config)).context("invalid run configuration")
}
