//! Polling core of the cephmon collectors.
//!
//! Each plugin is a `PollDriver` bound to one `Extractor`. On every tick the
//! driver runs the extractor, which shells out to the Ceph CLI through a
//! `CommandRunner`, flattens the nested stats it returns and hands each value
//! to a `MetricsSink` tagged with the configured host and cluster.
//!
//! Failures are contained per cycle: a failed command means missing metrics
//! for that cycle and a log record, never a crashed process.

/// Log at `info` when the plugin runs with `Verbose true`, at `debug` otherwise.
macro_rules! verbose {
    ($config:expr, $($arg:tt)+) => {
        if $config.verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod runner;
pub mod scheduler;
pub mod settings;
pub mod stats;

pub use config::{ClusterConfig, ConfigItem, ConfigValue};
pub use driver::{CycleOutcome, DriverState, PollDriver};
pub use error::{CollectError, ConfigError, RunError};
pub use extractor::{BenchParse, Extractor, LatencyExtractor, MdsExtractor, MonitorExtractor};
pub use runner::{CommandRunner, ShellRunner, StaticRunner};
pub use scheduler::{wait_for_shutdown_signal, Scheduler};
pub use settings::{CollectorConfig, PluginKind, PluginSection, SinkConfig, SinkKind};
pub use stats::{ExtractionResult, RawValue};
