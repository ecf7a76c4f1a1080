//! Pool write-latency benchmarks.
//!
//! Lists the cluster's pools, then runs a short `rados bench` write against
//! each one. The benchmark pipeline prints four latency figures in
//! milliseconds: average, standard deviation, max and min.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::{run_json, shell_word, Extractor, JSON_COMMAND_TIMEOUT};
use crate::config::ClusterConfig;
use crate::error::CollectError;
use crate::runner::CommandRunner;
use crate::stats::{ExtractionResult, RawValue};

/// Deadline for a single pool benchmark.
pub const BENCH_TIMEOUT: Duration = Duration::from_secs(30);

pub const LATENCY_METRICS: [&str; 4] = [
    "avg_latency",
    "stddev_latency",
    "max_latency",
    "min_latency",
];

/// How benchmark output is turned into values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchParse {
    /// Exactly four numeric lines are required; anything else skips the pool.
    #[default]
    Strict,
    /// Take the first four lines positionally as text and let dispatch decide.
    /// A pool with a bad line is then dropped as a whole at dispatch time.
    Lenient,
}

type BenchOutcome = (String, Result<[RawValue; 4], CollectError>);

pub struct LatencyExtractor {
    runner: Arc<dyn CommandRunner>,
    parse: BenchParse,
    concurrency: usize,
}

impl LatencyExtractor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            parse: BenchParse::default(),
            concurrency: 1,
        }
    }

    pub fn with_parse(mut self, parse: BenchParse) -> Self {
        self.parse = parse;
        self
    }

    /// Benchmark up to `concurrency` pools at once. Above 1, all benchmarks of
    /// a cycle also share a deadline of one poll interval.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn pools_command(cluster: &str) -> Result<String, CollectError> {
        Ok(format!(
            "ceph osd pool ls -f json --cluster {}",
            shell_word(cluster)?
        ))
    }

    pub fn bench_command(cluster: &str, pool: &str) -> Result<String, CollectError> {
        Ok(format!(
            "rados --cluster {} -p {} bench 10 write -t 1 -b 65536 2>/dev/null \
             | grep -i latency | awk '{{print 1000*$3}}'",
            shell_word(cluster)?,
            shell_word(pool)?
        ))
    }

    async fn list_pools(&self, cluster: &str) -> Result<Vec<String>, CollectError> {
        let command = Self::pools_command(cluster)?;
        let pools = run_json(self.runner.as_ref(), &command, JSON_COMMAND_TIMEOUT).await?;
        parse_pool_list(&command, &pools)
    }

    /// Benchmark every pool, returning the successful ones keyed by name.
    async fn bench_pools(
        &self,
        config: &ClusterConfig,
        pools: Vec<String>,
    ) -> BTreeMap<String, [RawValue; 4]> {
        let deadline = (self.concurrency > 1).then(|| Instant::now() + config.interval);
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut pending: BTreeSet<String> = pools.iter().cloned().collect();
        let mut tasks = JoinSet::new();

        for pool in pools {
            let runner = self.runner.clone();
            let permits = permits.clone();
            let cluster = config.cluster_name.clone();
            let parse = self.parse;
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let outcome = match Self::bench_command(&cluster, &pool) {
                    Ok(command) => match runner.run(&command, BENCH_TIMEOUT).await {
                        Ok(stdout) => parse_bench(&pool, &stdout, parse),
                        Err(source) => Err(CollectError::Command { command, source }),
                    },
                    Err(e) => Err(e),
                };
                (pool, outcome)
            });
        }

        let mut latencies = BTreeMap::new();
        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::error!(
                            plugin = self.name(),
                            cluster = %config.cluster_name,
                            pools = ?pending,
                            "Benchmarks still running at the cycle deadline, abandoning them"
                        );
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let outcome: BenchOutcome = match joined {
                Some(Ok(outcome)) => outcome,
                Some(Err(e)) => {
                    tracing::error!(plugin = self.name(), error = %e, "Benchmark task failed");
                    continue;
                }
                None => break,
            };

            let (pool, result) = outcome;
            pending.remove(&pool);
            match result {
                Ok(values) => {
                    latencies.insert(pool, values);
                }
                Err(e) => {
                    tracing::error!(
                        plugin = self.name(),
                        cluster = %config.cluster_name,
                        pool = %pool,
                        error = %e,
                        "Failed to run rados bench for pool"
                    );
                }
            }
        }

        latencies
    }
}

/// Parse `ceph osd pool ls -f json` output: a JSON array of pool names.
pub fn parse_pool_list(command: &str, pools: &serde_json::Value) -> Result<Vec<String>, CollectError> {
    let mismatch = || CollectError::SchemaMismatch {
        command: command.to_string(),
        field: "pool name list",
    };
    pools
        .as_array()
        .ok_or_else(mismatch)?
        .iter()
        .map(|p| p.as_str().map(str::to_string).ok_or_else(mismatch))
        .collect()
}

/// Parse benchmark output into the four latency values.
pub fn parse_bench(pool: &str, stdout: &str, mode: BenchParse) -> Result<[RawValue; 4], CollectError> {
    match mode {
        BenchParse::Lenient => {
            let mut lines = stdout.split('\n');
            Ok(std::array::from_fn(|_| {
                RawValue::Text(lines.next().unwrap_or_default().to_string())
            }))
        }
        BenchParse::Strict => {
            let lines: Vec<&str> = stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if lines.len() != LATENCY_METRICS.len() {
                return Err(CollectError::MalformedBenchmark {
                    pool: pool.to_string(),
                    reason: format!("expected 4 latency lines, got {}", lines.len()),
                });
            }

            let mut values = [0.0; 4];
            for (slot, line) in values.iter_mut().zip(&lines) {
                *slot = line
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| CollectError::MalformedBenchmark {
                        pool: pool.to_string(),
                        reason: format!("`{}` is not a finite number", line),
                    })?;
            }
            Ok(values.map(RawValue::Number))
        }
    }
}

#[async_trait]
impl Extractor for LatencyExtractor {
    fn name(&self) -> &'static str {
        "ceph-latency"
    }

    async fn collect(&self, config: &ClusterConfig) -> Option<ExtractionResult> {
        let pools = match self.list_pools(&config.cluster_name).await {
            Ok(pools) => pools,
            Err(e) => {
                tracing::error!(
                    plugin = self.name(),
                    cluster = %config.cluster_name,
                    error = %e,
                    "Failed to list pools"
                );
                return None;
            }
        };

        if pools.is_empty() {
            verbose!(config, plugin = self.name(), "No pools to benchmark");
            return None;
        }

        let listed = pools.len();
        let latencies = self.bench_pools(config, pools).await;

        if latencies.is_empty() {
            tracing::error!(
                plugin = self.name(),
                cluster = %config.cluster_name,
                listed,
                "rados bench failed for every pool"
            );
            return None;
        }
        if latencies.len() < listed {
            tracing::warn!(
                plugin = self.name(),
                cluster = %config.cluster_name,
                collected = latencies.len(),
                listed,
                "Partial latency collection"
            );
        }

        let key = config.cluster_key();
        let mut result = ExtractionResult::new();
        for (pool, values) in latencies {
            for (metric, value) in LATENCY_METRICS.iter().zip(values) {
                result.insert(&key, &[pool.as_str()], metric, value);
            }
        }
        Some(result)
    }
}
