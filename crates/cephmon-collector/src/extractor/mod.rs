//! Stats extractors, one per metric family.
//!
//! Each extractor shells out to the Ceph CLI through a `CommandRunner`,
//! parses what comes back and returns an `ExtractionResult` keyed by the
//! cluster key. Failures are logged here and turn into `None`; they never
//! reach the poll driver as errors.

pub mod latency;
pub mod mds;
pub mod monitor;

use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;

use crate::config::ClusterConfig;
use crate::error::CollectError;
use crate::runner::CommandRunner;
use crate::stats::ExtractionResult;

pub use latency::{BenchParse, LatencyExtractor};
pub use mds::MdsExtractor;
pub use monitor::{HealthState, MonitorExtractor};

/// Deadline for the JSON-producing `ceph` commands.
pub const JSON_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Plugin name, used in log records.
    fn name(&self) -> &'static str;

    /// Run one collection. `None` means there is nothing to publish this cycle.
    async fn collect(&self, config: &ClusterConfig) -> Option<ExtractionResult>;
}

/// Quote `value` as a single word of an `sh -c` command line.
pub(crate) fn shell_word(value: &str) -> Result<Cow<'_, str>, CollectError> {
    shlex::try_quote(value).map_err(|source| CollectError::UnquotableArgument {
        value: value.to_string(),
        source,
    })
}

/// Run a command and parse its stdout as JSON.
pub(crate) async fn run_json(
    runner: &dyn CommandRunner,
    command: &str,
    timeout: Duration,
) -> Result<Value, CollectError> {
    let stdout = runner
        .run(command, timeout)
        .await
        .map_err(|source| CollectError::Command {
            command: command.to_string(),
            source,
        })?;
    parse_json(command, &stdout)
}

pub(crate) fn parse_json(command: &str, stdout: &str) -> Result<Value, CollectError> {
    serde_json::from_str(stdout).map_err(|source| CollectError::MalformedJson {
        command: command.to_string(),
        source,
    })
}

pub(crate) fn field<'a>(
    command: &str,
    value: &'a Value,
    field: &'static str,
) -> Result<&'a Value, CollectError> {
    value.get(field).ok_or_else(|| CollectError::SchemaMismatch {
        command: command.to_string(),
        field,
    })
}

pub(crate) fn array_len(
    command: &str,
    value: &Value,
    name: &'static str,
) -> Result<usize, CollectError> {
    field(command, value, name)?
        .as_array()
        .map(Vec::len)
        .ok_or_else(|| CollectError::SchemaMismatch {
            command: command.to_string(),
            field: name,
        })
}
