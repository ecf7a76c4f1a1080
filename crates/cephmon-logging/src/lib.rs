//! Logging setup shared by the cephmon collectors.
//!
//! Every failure in a collection cycle ends up here as a log record, so the
//! subscriber is configured once at startup and then left alone.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to create rolling file appender in {dir}: {source}")]
    Appender {
        dir: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. If None, no file logging.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    /// Log rotation: "hourly", "daily", "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Whether to output JSON format.
    #[serde(default)]
    pub json_format: bool,

    /// Whether to also output to console (stderr).
    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "cephmon".into()
}

fn default_rotation() -> String {
    "hourly".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: default_rotation(),
            json_format: false,
            console_output: true,
        }
    }
}

impl LogConfig {
    /// Lower the level filter to `debug` when running verbosely. An explicit
    /// `trace` level is left untouched.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose && self.level != "trace" {
            self.level = "debug".into();
        }
        self
    }

    fn rotation(&self) -> rolling::Rotation {
        match self.rotation.as_str() {
            "daily" => rolling::Rotation::DAILY,
            "never" => rolling::Rotation::NEVER,
            // default to hourly
            _ => rolling::Rotation::HOURLY,
        }
    }
}

/// Initialize the logging system. Should be called once at program startup.
/// Returns a guard that must be held alive for the duration of the program
/// (for the non-blocking file writer).
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, LogError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Stdout belongs to the PUTVAL sink, so the console layer writes to stderr.
    let console_layer: Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> =
        if config.console_output {
            if config.json_format {
                Some(Box::new(fmt::layer().json().with_writer(std::io::stderr)))
            } else {
                Some(Box::new(fmt::layer().with_writer(std::io::stderr)))
            }
        } else {
            None
        };

    let (file_layer, guard): (
        Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>>,
        Option<tracing_appender::non_blocking::WorkerGuard>,
    ) = if let Some(ref log_dir) = config.log_dir {
        let file_appender = rolling::RollingFileAppender::builder()
            .rotation(config.rotation())
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(log_dir)
            .map_err(|source| LogError::Appender {
                dir: log_dir.clone(),
                source,
            })?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json_format {
            Box::new(fmt::layer().json().with_writer(non_blocking))
        } else {
            Box::new(fmt::layer().with_writer(non_blocking))
        };

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    registry
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)?;

    Ok(guard)
}
