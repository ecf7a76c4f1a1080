//! Collector configuration file.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [sink]
//! kind = "putval"
//!
//! [[plugin]]
//! kind = "latency"
//! bench_parse = "strict"
//! bench_concurrency = 4
//!
//! [plugin.options]
//! Cluster = "prod"
//! Interval = 120
//! Verbose = true
//! ```
//!
//! Each plugin's `options` table is handed to its driver as `ConfigItem`s,
//! so keys are matched exactly as collectd option names would be.

use cephmon_logging::LogConfig;
use cephmon_monitor::MetricsSink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ConfigItem, ConfigValue};
use crate::driver::PollDriver;
use crate::error::ConfigError;
use crate::extractor::{BenchParse, Extractor, LatencyExtractor, MdsExtractor, MonitorExtractor};
use crate::runner::CommandRunner;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Structured log records.
    #[default]
    Log,
    /// collectd exec-plugin `PUTVAL` lines on stdout.
    Putval,
    /// JSON objects appended to `path`.
    Jsonl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    /// Output file for the `jsonl` sink.
    #[serde(default = "default_sink_path")]
    pub path: PathBuf,
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("./cephmon-metrics.jsonl")
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            path: default_sink_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Latency,
    Mds,
    Mon,
}

/// A plugin option holding one value or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValues {
    One(ConfigValue),
    Many(Vec<ConfigValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSection {
    pub kind: PluginKind,

    /// Benchmark output handling, latency plugin only.
    #[serde(default)]
    pub bench_parse: BenchParse,

    /// Concurrent pool benchmarks, latency plugin only.
    #[serde(default = "default_bench_concurrency")]
    pub bench_concurrency: usize,

    #[serde(default)]
    pub options: BTreeMap<String, OptionValues>,
}

fn default_bench_concurrency() -> usize {
    1
}

impl PluginSection {
    pub fn new(kind: PluginKind) -> Self {
        Self {
            kind,
            bench_parse: BenchParse::default(),
            bench_concurrency: default_bench_concurrency(),
            options: BTreeMap::new(),
        }
    }

    pub fn config_items(&self) -> Vec<ConfigItem> {
        self.options
            .iter()
            .map(|(key, values)| {
                let values = match values {
                    OptionValues::One(value) => vec![value.clone()],
                    OptionValues::Many(values) => values.clone(),
                };
                ConfigItem::new(key.clone(), values)
            })
            .collect()
    }

    pub fn build_extractor(&self, runner: Arc<dyn CommandRunner>) -> Arc<dyn Extractor> {
        match self.kind {
            PluginKind::Latency => Arc::new(
                LatencyExtractor::new(runner)
                    .with_parse(self.bench_parse)
                    .with_concurrency(self.bench_concurrency),
            ),
            PluginKind::Mds => Arc::new(MdsExtractor::new(runner)),
            PluginKind::Mon => Arc::new(MonitorExtractor::new(runner)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub logging: LogConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default = "default_plugins", rename = "plugin")]
    pub plugins: Vec<PluginSection>,
}

fn default_plugins() -> Vec<PluginSection> {
    vec![
        PluginSection::new(PluginKind::Latency),
        PluginSection::new(PluginKind::Mds),
        PluginSection::new(PluginKind::Mon),
    ]
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            logging: LogConfig::default(),
            sink: SinkConfig::default(),
            plugins: default_plugins(),
        }
    }
}

impl CollectorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build and configure one driver per plugin section.
    ///
    /// A plugin whose options are rejected is logged and returned in the
    /// `Disabled` state; it never prevents the others from starting.
    pub fn build_drivers(
        &self,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<dyn MetricsSink>,
    ) -> Vec<PollDriver> {
        self.plugins
            .iter()
            .map(|section| {
                let mut driver =
                    PollDriver::new(section.build_extractor(runner.clone()), sink.clone());
                if let Err(e) = driver.configure(&section.config_items()) {
                    tracing::error!(
                        plugin = driver.name(),
                        error = %e,
                        "Failed to initialize plugin, leaving it disabled"
                    );
                }
                driver
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverState;
    use crate::runner::StaticRunner;
    use cephmon_monitor::InMemorySink;
    use std::time::Duration;

    const SAMPLE: &str = r#"
[logging]
level = "debug"

[sink]
kind = "jsonl"
path = "/var/lib/cephmon/metrics.jsonl"

[[plugin]]
kind = "latency"
bench_parse = "lenient"
bench_concurrency = 4

[plugin.options]
Cluster = "prod"
Interval = 120
Host = "ceph-admin-01"

[[plugin]]
kind = "mon"

[plugin.options]
Cluster = "prod"
Verbose = true
Interval = [30]
"#;

    #[test]
    fn test_default_config() {
        let config = CollectorConfig::default();
        assert_eq!(config.sink.kind, SinkKind::Log);
        let kinds: Vec<PluginKind> = config.plugins.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PluginKind::Latency, PluginKind::Mds, PluginKind::Mon]);
        assert!(config.plugins.iter().all(|p| p.options.is_empty()));
    }

    #[test]
    fn test_parse_sample() {
        let config = CollectorConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.sink.kind, SinkKind::Jsonl);
        assert_eq!(config.plugins.len(), 2);

        let latency = &config.plugins[0];
        assert_eq!(latency.kind, PluginKind::Latency);
        assert_eq!(latency.bench_parse, BenchParse::Lenient);
        assert_eq!(latency.bench_concurrency, 4);

        let items = latency.config_items();
        assert!(items.contains(&ConfigItem::string("Cluster", "prod")));
        assert!(items.contains(&ConfigItem::number("Interval", 120.0)));

        let mon = &config.plugins[1];
        assert_eq!(mon.bench_parse, BenchParse::Strict);
        assert!(mon.config_items().contains(&ConfigItem::boolean("Verbose", true)));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = CollectorConfig::parse("").unwrap();
        assert_eq!(config, CollectorConfig::default());
    }

    #[test]
    fn test_unknown_plugin_kind_rejected() {
        let err = CollectorConfig::parse("[[plugin]]\nkind = \"osd\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_default_renders_and_reparses() {
        let config = CollectorConfig::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(CollectorConfig::parse(&rendered).unwrap(), config);
    }

    #[test]
    fn test_build_drivers_isolates_bad_plugin() {
        let mut config = CollectorConfig::parse(SAMPLE).unwrap();
        let mut broken = PluginSection::new(PluginKind::Mds);
        broken.options.insert(
            "Interval".into(),
            OptionValues::One(ConfigValue::String("never".into())),
        );
        config.plugins.push(broken);

        let drivers = config.build_drivers(
            Arc::new(StaticRunner::new()),
            Arc::new(InMemorySink::new()),
        );
        assert_eq!(drivers.len(), 3);

        assert_eq!(drivers[0].name(), "ceph-latency");
        let latency = drivers[0].config().unwrap();
        assert_eq!(latency.host, "ceph-admin-01");
        assert_eq!(latency.interval, Duration::from_secs(120));

        assert_eq!(drivers[1].name(), "ceph-mon");
        assert!(drivers[1].config().unwrap().verbose);
        assert_eq!(drivers[1].interval(), Some(Duration::from_secs(30)));

        assert_eq!(drivers[2].name(), "ceph-mds");
        assert!(matches!(drivers[2].state(), DriverState::Disabled(_)));
    }
}
