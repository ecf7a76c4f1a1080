//! Error types for command execution, extraction and configuration.

use std::time::Duration;

/// Failure of a single external command invocation.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The shell could not be spawned or waited on.
    #[error("failed to spawn: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// The command outlived its deadline and was killed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The command exited unsuccessfully. `code` is `None` when it was killed
    /// by a signal.
    #[error("exited with {}: {stderr}", exit_status(.code))]
    ExecutionFailed { code: Option<i32>, stderr: String },

    /// The command succeeded but printed nothing but whitespace.
    #[error("produced no output")]
    EmptyOutput,
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

/// Failure of one data source within a collection cycle.
///
/// These are always caught inside the extractor that raised them; they never
/// escape a cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("command `{command}` failed: {source}")]
    Command {
        command: String,
        #[source]
        source: RunError,
    },

    #[error("malformed JSON from `{command}`: {source}")]
    MalformedJson {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected output from `{command}`: missing `{field}`")]
    SchemaMismatch {
        command: String,
        field: &'static str,
    },

    #[error("cannot pass {value:?} on a command line: {source}")]
    UnquotableArgument {
        value: String,
        #[source]
        source: shlex::QuoteError,
    },

    #[error("malformed benchmark output for pool {pool}: {reason}")]
    MalformedBenchmark { pool: String, reason: String },
}

/// Configuration or initialisation failure. A driver that hits one of these
/// stays inert.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("option {key} expects {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("failed to resolve local hostname: {0}")]
    Hostname(#[source] std::io::Error),

    #[error("plugin is already configured")]
    AlreadyConfigured,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}
