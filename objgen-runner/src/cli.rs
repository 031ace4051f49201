//! Command line interface of `objgen`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use objgen_engine::stop::StopReason;
use objgen_engine::summary::Summary;

use crate::config::Config;
use crate::http::HttpClient;
use crate::{observability, setup};

/// Object storage load generator.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Validate(ValidateCommand),
    Version(VersionCommand),
}

/// run a load test against the configured target
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// check the configuration without sending any requests
///
/// This loads the object pool and creates all components of a run, reporting the first
/// configuration error.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "validate")]
struct ValidateCommand {}

/// print the objgen version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("objgen {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("objgen-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads.max(1))
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(RunCommand {}) => run(config).await.map(|_| ()),
            Command::Validate(ValidateCommand {}) => validate(&config),
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

/// Runs a load test until a stopping condition is met or the process is signalled.
///
/// The summary is printed and written to the configured summary file.
pub async fn run(config: Config) -> Result<Summary> {
    let client = HttpClient::new(&config.target, &config.client)?;
    let load_test = setup::load_test(&config, Arc::new(client))?;

    let stop = load_test.stop_signal();
    let signals = tokio::spawn(async move {
        elegant_departure::tokio::depart()
            .on_termination()
            .on_sigint()
            .await;
        stop.stop(StopReason::Interrupted);
    });

    let result = load_test.run().await;
    signals.abort();
    let summary = result.context("load test failed")?;

    summary.print();
    if let Some(path) = &config.summary_path {
        summary
            .write_json(path)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
    }

    Ok(summary)
}

/// Creates all components of a run without starting it.
pub fn validate(config: &Config) -> Result<()> {
    let client = HttpClient::new(&config.target, &config.client)?;
    let load_test = setup::load_test(config, Arc::new(client))?;
    drop(load_test);

    println!("configuration is valid");
    Ok(())
}
