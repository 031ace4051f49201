//! Configuration for the object generator.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `OG__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `OG__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `OG__TARGET__CONTAINER=bucket` sets the container requests are sent to
//! - `OG__SCHEDULER__TYPE=rate` selects a rate scheduler
//! - `OG__SCHEDULER__RATE=250` admits 250 operations per second
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! target:
//!   container: bucket
//!
//! scheduler:
//!   type: rate
//!   rate: 250
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use objgen_engine::distribution::Shape;
use objgen_engine::mix::OperationWeights;
use objgen_engine::request::{Data, Operation};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "OG__";

/// Newtype around `String` that keeps secrets out of logs. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// The secret value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// URL scheme of the target service.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// The scheme as it appears in URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// How requests are spread across [`Target::hosts`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostSelection {
    /// Cycle through the hosts in order.
    #[default]
    RoundRobin,
    /// Pick a host at random, proportional to its weight.
    Random,
}

/// A host of the target service.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Host {
    /// Host name or IP address.
    pub address: String,

    /// Relative weight for [`HostSelection::Random`].
    ///
    /// # Default
    ///
    /// `1.0`
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// The service requests are sent to.
///
/// Object URLs are built as `{scheme}://{host}[:{port}]/[{uri_root}/]{container}/{object_prefix}{id}`,
/// where `id` is the lowercase hex form of the object identifier. Listing requests target the
/// container itself.
///
/// Used in: [`Config::target`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Target {
    /// URL scheme.
    ///
    /// # Default
    ///
    /// `http`
    ///
    /// # Environment Variable
    ///
    /// `OG__TARGET__SCHEME`
    pub scheme: Scheme,

    /// Hosts of the target service.
    ///
    /// # Default
    ///
    /// A single host at `127.0.0.1`.
    pub hosts: Vec<Host>,

    /// Selection of hosts per request.
    ///
    /// # Default
    ///
    /// `roundrobin`
    ///
    /// # Environment Variable
    ///
    /// `OG__TARGET__HOST_SELECTION`
    pub host_selection: HostSelection,

    /// Port of the target service. Without a port, the default port of the scheme is used.
    ///
    /// # Environment Variable
    ///
    /// `OG__TARGET__PORT`
    pub port: Option<u16>,

    /// Name of the container, or bucket, holding the objects.
    ///
    /// # Default
    ///
    /// `objgen`
    ///
    /// # Environment Variable
    ///
    /// `OG__TARGET__CONTAINER`
    pub container: String,

    /// Path prefix in front of the container.
    ///
    /// # Environment Variable
    ///
    /// `OG__TARGET__URI_ROOT`
    pub uri_root: Option<String>,

    /// Headers added to every request.
    ///
    /// # Example
    ///
    /// ```yaml
    /// target:
    ///   headers:
    ///     x-tenant: load-test
    /// ```
    pub headers: BTreeMap<String, String>,

    /// Prefix prepended to object names in URLs.
    ///
    /// # Environment Variable
    ///
    /// `OG__TARGET__OBJECT_PREFIX`
    pub object_prefix: String,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            hosts: vec![Host {
                address: "127.0.0.1".to_owned(),
                weight: default_weight(),
            }],
            host_selection: HostSelection::RoundRobin,
            port: None,
            container: "objgen".to_owned(),
            uri_root: None,
            headers: BTreeMap::new(),
            object_prefix: String::new(),
        }
    }
}

/// A distribution of object sizes for writes.
///
/// Used in: [`Config::filesizes`]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FileSize {
    /// Shape of the distribution.
    pub distribution: Shape,

    /// Average object size, for example `"1 MiB"`.
    pub average: ByteSize,

    /// Spread around the average. Its meaning depends on the shape: half the width of a uniform
    /// distribution, or the standard deviation of a normal one.
    #[serde(default)]
    pub spread: ByteSize,

    /// Relative weight of this profile among all profiles.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl Default for FileSize {
    fn default() -> Self {
        Self {
            distribution: Shape::Constant,
            average: ByteSize::mib(5),
            spread: ByteSize::b(0),
            weight: default_weight(),
        }
    }
}

/// Unit of [`SchedulerConfig::Rate`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    /// Operations per second.
    #[default]
    Second,
    /// Operations per minute.
    Minute,
    /// Operations per hour.
    Hour,
}

impl RateUnit {
    /// Converts a rate in this unit to operations per second.
    pub fn per_second(self, rate: f64) -> f64 {
        match self {
            RateUnit::Second => rate,
            RateUnit::Minute => rate / 60.0,
            RateUnit::Hour => rate / 3600.0,
        }
    }
}

/// Admission policy.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
///
/// Used in: [`Config::scheduler`]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchedulerConfig {
    /// Admits operations at a fixed rate (type `"rate"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// scheduler:
    ///   type: rate
    ///   rate: 30
    ///   unit: minute
    ///   ramp_up: 1m
    /// ```
    Rate {
        /// Target rate in operations per `unit`.
        rate: f64,
        /// Time unit of `rate`.
        #[serde(default)]
        unit: RateUnit,
        /// Duration over which the rate increases linearly from `floor` to `rate`.
        #[serde(default, with = "humantime_serde")]
        ramp_up: Duration,
        /// Rate at the start of the ramp-up, in operations per `unit`.
        #[serde(default)]
        floor: f64,
    },

    /// Keeps a fixed number of operations in flight (type `"concurrency"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// scheduler:
    ///   type: concurrency
    ///   count: 64
    /// ```
    Concurrency {
        /// Maximum number of operations in flight.
        count: usize,
        /// Duration over which the maximum grows linearly from one to `count`.
        #[serde(default, with = "humantime_serde")]
        ramp_up: Duration,
    },
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig::Concurrency {
            count: 1,
            ramp_up: Duration::ZERO,
        }
    }
}

/// The counter a [`ThresholdConfig`] observes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    /// Completed operations.
    Operations,
    /// Transferred body bytes.
    Bytes,
    /// Responses with [`ThresholdConfig::status`].
    Status,
}

/// A custom stopping condition.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ThresholdConfig {
    /// The operation to observe. Without an operation, all operations are counted.
    #[serde(default)]
    pub operation: Option<Operation>,
    /// The counter to observe.
    pub counter: CounterKind,
    /// The status code, required for [`CounterKind::Status`].
    #[serde(default)]
    pub status: Option<u16>,
    /// The run stops once the counter reaches this value.
    pub value: u64,
}

/// When to stop a run.
///
/// The run stops as soon as the first condition is met. Without any condition, it runs until
/// interrupted.
///
/// Used in: [`Config::stopping_conditions`]
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoppingConditions {
    /// Total number of completed operations.
    ///
    /// # Environment Variable
    ///
    /// `OG__STOPPING_CONDITIONS__OPERATIONS`
    pub operations: Option<u64>,

    /// Maximum duration of the run, for example `10m`.
    ///
    /// # Environment Variable
    ///
    /// `OG__STOPPING_CONDITIONS__RUNTIME`
    #[serde(with = "humantime_serde")]
    pub runtime: Option<Duration>,

    /// Maximum number of responses per status code.
    ///
    /// # Example
    ///
    /// ```yaml
    /// stopping_conditions:
    ///   status_codes:
    ///     500: 10
    /// ```
    pub status_codes: BTreeMap<String, u64>,

    /// Further conditions on per-operation counters.
    pub thresholds: Vec<ThresholdConfig>,
}

/// Tracking of objects in the target store.
///
/// Used in: [`Config::object_manager`]
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ObjectManagerConfig {
    /// File holding the identifiers of existing objects.
    ///
    /// The pool is loaded from this file at startup and written back during and at the end of
    /// the run. Without a path, the run starts with an empty pool and nothing is persisted.
    ///
    /// # Environment Variable
    ///
    /// `OG__OBJECT_MANAGER__PATH`
    pub path: Option<PathBuf>,

    /// Time between checkpoints of the pool during the run.
    ///
    /// # Environment Variable
    ///
    /// `OG__OBJECT_MANAGER__CHECKPOINT_INTERVAL`
    #[serde(with = "humantime_serde")]
    pub checkpoint_interval: Option<Duration>,
}

/// Behavior of the HTTP client.
///
/// Used in: [`Config::client`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout of a single request, including its body. Timed out requests are recorded as
    /// failures.
    ///
    /// # Default
    ///
    /// `60s`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Timeout for establishing connections.
    ///
    /// # Default
    ///
    /// `10s`
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Maximum time to wait for in-flight requests once the run stopped. Requests still pending
    /// afterwards are abandoned.
    ///
    /// # Default
    ///
    /// `30s`
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,

    /// Stop the run on protocol violations instead of logging them.
    ///
    /// # Default
    ///
    /// `false`
    pub strict: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(60)),
            connect_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            strict: false,
        }
    }
}

/// Runtime configuration.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads of the Tokio runtime.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `OG__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,

    /// Number of tasks admitting operations concurrently.
    ///
    /// A single admission task is enough for most rates. Raise this if the scheduler falls
    /// behind a high target rate.
    ///
    /// # Default
    ///
    /// `1`
    ///
    /// # Environment Variable
    ///
    /// `OG__RUNTIME__WORKERS`
    pub workers: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            workers: 1,
        }
    }
}

/// [Sentry](https://sentry.io/) error reporting configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
///
/// Used in: [`Config::sentry`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN. When `None`, Sentry integration is disabled.
    ///
    /// # Environment Variable
    ///
    /// `OG__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name reported with events.
    ///
    /// # Environment Variable
    ///
    /// `OG__SENTRY__ENVIRONMENT`
    pub environment: Option<Cow<'static, str>>,

    /// Error event sampling rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `1.0`
    pub sample_rate: f32,

    /// Enable Sentry SDK debug output.
    pub debug: bool,

    /// Additional tags attached to all events.
    pub tags: BTreeMap<String, String>,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            debug: false,
            tags: BTreeMap::new(),
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::error::Error for FormatParseError {}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(format)
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output: TRACE, DEBUG, INFO, WARN, ERROR or OFF.
    ///
    /// The `RUST_LOG` environment variable takes precedence and also accepts per-module
    /// directives.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `OG__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Environment Variable
    ///
    /// `OG__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the object generator.
///
/// Configuration is loaded from multiple sources with the following precedence:
/// 1. Environment variables (highest priority)
/// 2. YAML configuration file (if provided via `-c` flag)
/// 3. Default values
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The service requests are sent to.
    pub target: Target,

    /// Relative weights of the operations.
    ///
    /// If all weights are zero, only writes are issued.
    ///
    /// # Example
    ///
    /// ```yaml
    /// operations:
    ///   write: 50
    ///   read: 40
    ///   delete: 10
    /// ```
    pub operations: OperationWeights,

    /// Object size profiles for writes and overwrites, selected by weight.
    ///
    /// # Default
    ///
    /// A single profile of constant 5 MiB objects.
    pub filesizes: Vec<FileSize>,

    /// Contents of uploaded objects.
    ///
    /// # Default
    ///
    /// `random`
    ///
    /// # Environment Variable
    ///
    /// `OG__DATA`
    pub data: Data,

    /// Admission policy.
    pub scheduler: SchedulerConfig,

    /// When to stop the run.
    pub stopping_conditions: StoppingConditions,

    /// Persistence of the object pool.
    pub object_manager: ObjectManagerConfig,

    /// HTTP client behavior.
    pub client: ClientConfig,

    /// File the summary of the run is written to as JSON.
    ///
    /// # Environment Variable
    ///
    /// `OG__SUMMARY_PATH`
    pub summary_path: Option<PathBuf>,

    /// Runtime configuration.
    pub runtime: Runtime,

    /// Seed for the selection of operations, sizes and contents. Without a seed, every run uses
    /// a different random sequence.
    ///
    /// # Environment Variable
    ///
    /// `OG__SEED`
    pub seed: Option<u64>,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry configuration.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: Target::default(),
            operations: OperationWeights::default(),
            filesizes: vec![FileSize::default()],
            data: Data::default(),
            scheduler: SchedulerConfig::default(),
            stopping_conditions: StoppingConditions::default(),
            object_manager: ObjectManagerConfig::default(),
            client: ClientConfig::default(),
            summary_path: None,
            runtime: Runtime::default(),
            seed: None,
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the given YAML file and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `OG__`)
    ///
    /// Values are only parsed here. Semantic validation happens when the components of a run are
    /// created in [`setup`](crate::setup).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.target.container, "objgen");
            assert_eq!(config.target.hosts.len(), 1);
            assert_eq!(config.filesizes, vec![FileSize::default()]);
            assert_eq!(config.scheduler, SchedulerConfig::default());
            assert_eq!(config.runtime.workers, 1);
            assert!(!config.sentry.is_enabled());

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OG__TARGET__SCHEME", "https");
            jail.set_env("OG__TARGET__PORT", "9000");
            jail.set_env("OG__TARGET__CONTAINER", "bucket");
            jail.set_env("OG__TARGET__HEADERS__X_TENANT", "load");
            jail.set_env("OG__OPERATIONS__READ", "40");
            jail.set_env("OG__SCHEDULER__TYPE", "rate");
            jail.set_env("OG__SCHEDULER__RATE", "250");
            jail.set_env("OG__STOPPING_CONDITIONS__RUNTIME", "10m");
            jail.set_env("OG__DATA", "zeroes");
            jail.set_env("OG__SEED", "42");
            jail.set_env("OG__SENTRY__DSN", "abcde");

            let config = Config::load(None).unwrap();

            assert_eq!(config.target.scheme, Scheme::Https);
            assert_eq!(config.target.port, Some(9000));
            assert_eq!(config.target.container, "bucket");
            assert_eq!(
                config.target.headers,
                [("x_tenant".into(), "load".into())].into()
            );
            assert_eq!(config.operations.read, 40.0);
            assert_eq!(
                config.scheduler,
                SchedulerConfig::Rate {
                    rate: 250.0,
                    unit: RateUnit::Second,
                    ramp_up: Duration::ZERO,
                    floor: 0.0,
                }
            );
            assert_eq!(
                config.stopping_conditions.runtime,
                Some(Duration::from_secs(600))
            );
            assert_eq!(config.data, Data::Zeroes);
            assert_eq!(config.seed, Some(42));
            assert_eq!(config.sentry.dsn.unwrap().expose_secret().as_str(), "abcde");

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            target:
                hosts:
                    - address: a.example.com
                      weight: 3
                    - address: b.example.com
                host_selection: random
                uri_root: v1
                object_prefix: og-
            operations:
                write: 60
                delete: 40
            filesizes:
                - distribution: uniform
                  average: 1 MiB
                  spread: 512 KiB
                  weight: 2
                - distribution: constant
                  average: 100 KB
            scheduler:
                type: concurrency
                count: 32
                ramp_up: 30s
            stopping_conditions:
                operations: 1000
                status_codes:
                    500: 10
                thresholds:
                    - operation: write
                      counter: bytes
                      value: 1000000
            object_manager:
                path: pool.bin
                checkpoint_interval: 1m
            client:
                strict: true
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            let hosts = &config.target.hosts;
            assert_eq!(hosts.len(), 2);
            assert_eq!(hosts[0].weight, 3.0);
            assert_eq!(hosts[1].weight, 1.0);
            assert_eq!(config.target.host_selection, HostSelection::Random);
            assert_eq!(config.target.uri_root.as_deref(), Some("v1"));

            assert_eq!(config.operations.write, 60.0);
            assert_eq!(config.operations.delete, 40.0);
            assert_eq!(config.operations.read, 0.0);

            assert_eq!(config.filesizes.len(), 2);
            assert_eq!(config.filesizes[0].distribution, Shape::Uniform);
            assert_eq!(config.filesizes[0].average, ByteSize::mib(1));
            assert_eq!(config.filesizes[0].spread, ByteSize::kib(512));
            assert_eq!(config.filesizes[1].weight, 1.0);

            assert_eq!(
                config.scheduler,
                SchedulerConfig::Concurrency {
                    count: 32,
                    ramp_up: Duration::from_secs(30),
                }
            );

            let conditions = &config.stopping_conditions;
            assert_eq!(conditions.operations, Some(1000));
            assert_eq!(conditions.status_codes.get("500"), Some(&10));
            assert_eq!(conditions.thresholds[0].operation, Some(Operation::Write));
            assert_eq!(conditions.thresholds[0].counter, CounterKind::Bytes);

            assert_eq!(
                config.object_manager.checkpoint_interval,
                Some(Duration::from_secs(60))
            );
            assert!(config.client.strict);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            target:
                container: from-yaml
            scheduler:
                type: rate
                rate: 10
                unit: minute
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("OG__TARGET__CONTAINER", "from-env");
            jail.set_env("OG__SCHEDULER__RATE", "20");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // Env should overwrite the yaml config
            assert_eq!(config.target.container, "from-env");
            let SchedulerConfig::Rate { rate, unit, .. } = config.scheduler else {
                panic!("expected rate scheduler");
            };
            assert_eq!(rate, 20.0);
            assert_eq!(unit, RateUnit::Minute);

            Ok(())
        });
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Auto);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn converts_rate_units() {
        assert_eq!(RateUnit::Second.per_second(5.0), 5.0);
        assert_eq!(RateUnit::Minute.per_second(120.0), 2.0);
        assert_eq!(RateUnit::Hour.per_second(7200.0), 2.0);
    }
}
