//! Metadata server census.

use async_trait::async_trait;
use std::sync::Arc;

use super::{field, run_json, shell_word, Extractor, JSON_COMMAND_TIMEOUT};
use crate::config::ClusterConfig;
use crate::error::CollectError;
use crate::runner::CommandRunner;
use crate::stats::ExtractionResult;

pub struct MdsExtractor {
    runner: Arc<dyn CommandRunner>,
}

impl MdsExtractor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn dump_command(cluster: &str) -> Result<String, CollectError> {
        Ok(format!(
            "ceph mds dump --format json --cluster {}",
            shell_word(cluster)?
        ))
    }

    async fn mds_count(&self, config: &ClusterConfig) -> Result<usize, CollectError> {
        let command = Self::dump_command(&config.cluster_name)?;
        let dump = run_json(self.runner.as_ref(), &command, JSON_COMMAND_TIMEOUT).await?;
        parse_info_count(&command, &dump)
    }
}

/// Number of daemons in the dump's `info` map.
pub fn parse_info_count(command: &str, dump: &serde_json::Value) -> Result<usize, CollectError> {
    field(command, dump, "info")?
        .as_object()
        .map(|info| info.len())
        .ok_or_else(|| CollectError::SchemaMismatch {
            command: command.to_string(),
            field: "info",
        })
}

#[async_trait]
impl Extractor for MdsExtractor {
    fn name(&self) -> &'static str {
        "ceph-mds"
    }

    async fn collect(&self, config: &ClusterConfig) -> Option<ExtractionResult> {
        let count = match self.mds_count(config).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(
                    plugin = self.name(),
                    cluster = %config.cluster_name,
                    error = %e,
                    "Failed to collect mds stats"
                );
                return None;
            }
        };

        let mut result = ExtractionResult::new();
        result.insert(&config.cluster_key(), &["mds"], "number", count);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{Scripted, StaticRunner};
    use crate::stats::RawValue;
    use std::time::Duration;

    fn config() -> ClusterConfig {
        ClusterConfig {
            cluster_name: "prod".into(),
            host: "node-01".into(),
            interval: Duration::from_secs(60),
            verbose: false,
        }
    }

    async fn collect_with(stdout: Scripted) -> Option<ExtractionResult> {
        let runner = StaticRunner::new().reply(MdsExtractor::dump_command("prod").unwrap(), stdout);
        MdsExtractor::new(Arc::new(runner)).collect(&config()).await
    }

    #[tokio::test]
    async fn test_counts_info_entries() {
        let dump = r#"{"epoch": 12, "info": {"gid_4100": {"name": "a"}, "gid_4200": {"name": "b"}}}"#;
        let result = collect_with(Scripted::Output(dump.into())).await.unwrap();
        assert_eq!(
            result.get("ceph-prod", &["mds"], "number"),
            Some(&RawValue::Number(2.0))
        );
    }

    #[tokio::test]
    async fn test_empty_info_is_zero() {
        let result = collect_with(Scripted::Output(r#"{"info": {}}"#.into()))
            .await
            .unwrap();
        assert_eq!(
            result.get("ceph-prod", &["mds"], "number"),
            Some(&RawValue::Number(0.0))
        );
    }

    #[tokio::test]
    async fn test_failures_yield_nothing() {
        for reply in [
            Scripted::Exit(1),
            Scripted::Timeout,
            Scripted::Empty,
            Scripted::SpawnFailure,
            Scripted::Output("not json".into()),
            Scripted::Output(r#"{"epoch": 3}"#.into()),
            Scripted::Output(r#"{"info": []}"#.into()),
        ] {
            assert!(collect_with(reply).await.is_none());
        }
    }

    #[test]
    fn test_missing_info_is_schema_mismatch() {
        let err = parse_info_count("cmd", &serde_json::json!({"up": {}})).unwrap_err();
        assert!(matches!(err, CollectError::SchemaMismatch { field: "info", .. }));
    }
}
