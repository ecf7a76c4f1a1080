//! Monitor quorum and cluster health census.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{array_len, field, run_json, shell_word, Extractor, JSON_COMMAND_TIMEOUT};
use crate::config::ClusterConfig;
use crate::error::CollectError;
use crate::runner::CommandRunner;
use crate::stats::ExtractionResult;

/// Overall cluster health as reported by `ceph status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Ok,
    Warn,
    Err,
    /// Any status string other than the three known ones.
    Unknown,
}

impl HealthState {
    pub fn parse(status: &str) -> Self {
        if status.eq_ignore_ascii_case("health_ok") {
            HealthState::Ok
        } else if status.eq_ignore_ascii_case("health_warn") {
            HealthState::Warn
        } else if status.eq_ignore_ascii_case("health_err") {
            HealthState::Err
        } else {
            HealthState::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonStats {
    pub number: usize,
    pub quorum: usize,
    pub health: HealthState,
}

pub struct MonitorExtractor {
    runner: Arc<dyn CommandRunner>,
}

impl MonitorExtractor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn dump_command(cluster: &str) -> Result<String, CollectError> {
        Ok(format!(
            "ceph mon dump --format json --cluster {}",
            shell_word(cluster)?
        ))
    }

    pub fn status_command(cluster: &str) -> Result<String, CollectError> {
        Ok(format!(
            "ceph status --format json --cluster {}",
            shell_word(cluster)?
        ))
    }

    async fn mon_stats(&self, config: &ClusterConfig) -> Result<MonStats, CollectError> {
        let dump_cmd = Self::dump_command(&config.cluster_name)?;
        let status_cmd = Self::status_command(&config.cluster_name)?;

        let dump = run_json(self.runner.as_ref(), &dump_cmd, JSON_COMMAND_TIMEOUT).await?;
        let status = run_json(self.runner.as_ref(), &status_cmd, JSON_COMMAND_TIMEOUT).await?;

        Ok(MonStats {
            number: array_len(&dump_cmd, &dump, "mons")?,
            quorum: array_len(&dump_cmd, &dump, "quorum")?,
            health: parse_health(&status_cmd, &status)?,
        })
    }
}

/// Read `health.status`, falling back to the pre-luminous
/// `health.overall_status`.
pub fn parse_health(command: &str, status: &Value) -> Result<HealthState, CollectError> {
    let health = field(command, status, "health")?;
    let text = health
        .get("status")
        .or_else(|| health.get("overall_status"))
        .and_then(Value::as_str)
        .ok_or_else(|| CollectError::SchemaMismatch {
            command: command.to_string(),
            field: "health.status",
        })?;
    Ok(HealthState::parse(text))
}

#[async_trait]
impl Extractor for MonitorExtractor {
    fn name(&self) -> &'static str {
        "ceph-mon"
    }

    async fn collect(&self, config: &ClusterConfig) -> Option<ExtractionResult> {
        let stats = match self.mon_stats(config).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(
                    plugin = self.name(),
                    cluster = %config.cluster_name,
                    error = %e,
                    "Failed to collect mon stats"
                );
                return None;
            }
        };

        if stats.health == HealthState::Unknown {
            tracing::warn!(
                plugin = self.name(),
                cluster = %config.cluster_name,
                "Unrecognized health status, reporting all health flags as 0"
            );
        }

        let key = config.cluster_key();
        let mut result = ExtractionResult::new();
        result.insert(&key, &["mon"], "number", stats.number);
        result.insert(&key, &["mon"], "quorum", stats.quorum);
        result.insert(&key, &["mon"], "health", stats.health == HealthState::Ok);
        result.insert(&key, &["mon"], "warn", stats.health == HealthState::Warn);
        result.insert(&key, &["mon"], "error", stats.health == HealthState::Err);
        Some(result)
    }
}
