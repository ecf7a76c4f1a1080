//! Plugin options and the resolved per-plugin cluster configuration.
//!
//! Options arrive the way collectd hands them to a plugin: an ordered list of
//! keys, each carrying one or more typed values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_CLUSTER: &str = "ceph";
pub const DEFAULT_INTERVAL_SECS: f64 = 60.0;

/// A single typed option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Boolean(bool),
    Number(f64),
    String(String),
}

/// One `Key value...` line of plugin configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigItem {
    pub key: String,
    pub values: Vec<ConfigValue>,
}

impl ConfigItem {
    pub fn new(key: impl Into<String>, values: Vec<ConfigValue>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, vec![ConfigValue::String(value.into())])
    }

    pub fn number(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, vec![ConfigValue::Number(value)])
    }

    pub fn boolean(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, vec![ConfigValue::Boolean(value)])
    }

    fn first_string(&self) -> Result<String, ConfigError> {
        match self.values.first() {
            Some(ConfigValue::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(self.invalid("a non-empty string")),
        }
    }

    fn first_number(&self) -> Result<f64, ConfigError> {
        match self.values.first() {
            Some(ConfigValue::Number(n)) => Ok(*n),
            Some(ConfigValue::String(s)) => s.trim().parse().map_err(|_| self.invalid("a number")),
            _ => Err(self.invalid("a number")),
        }
    }

    fn first_bool(&self) -> Result<bool, ConfigError> {
        match self.values.first() {
            Some(ConfigValue::Boolean(b)) => Ok(*b),
            Some(ConfigValue::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(ConfigValue::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(self.invalid("a boolean")),
        }
    }

    fn invalid(&self, expected: &'static str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.key.clone(),
            expected,
        }
    }
}

/// Resolved configuration of one plugin instance. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub cluster_name: String,
    /// Host label attached to every dispatched value.
    pub host: String,
    pub interval: Duration,
    pub verbose: bool,
}

impl ClusterConfig {
    /// Build a configuration from plugin options, resolving the local hostname
    /// when no `Host` override is given.
    pub fn from_items(items: &[ConfigItem]) -> Result<Self, ConfigError> {
        Self::from_items_with(items, local_hostname)
    }

    pub fn from_items_with<F>(items: &[ConfigItem], resolve_host: F) -> Result<Self, ConfigError>
    where
        F: FnOnce() -> std::io::Result<String>,
    {
        let mut cluster_name = DEFAULT_CLUSTER.to_string();
        let mut host = None;
        let mut interval_secs = DEFAULT_INTERVAL_SECS;
        let mut verbose = false;

        for item in items {
            match item.key.to_ascii_lowercase().as_str() {
                "cluster" => cluster_name = item.first_string()?,
                "host" => host = Some(item.first_string()?),
                "interval" => interval_secs = item.first_number()?,
                "verbose" => verbose = item.first_bool()?,
                _ => {
                    tracing::warn!(
                        key = %item.key,
                        values = ?item.values,
                        "Ignoring unrecognized plugin option"
                    );
                }
            }
        }

        let interval = match Duration::try_from_secs_f64(interval_secs) {
            Ok(interval) if !interval.is_zero() => interval,
            _ => return Err(ConfigError::InvalidInterval(interval_secs)),
        };

        let host = match host {
            Some(host) => host,
            None => resolve_host().map_err(ConfigError::Hostname)?,
        };

        Ok(Self {
            cluster_name,
            host,
            interval,
            verbose,
        })
    }

    /// Key under which all of this cluster's stats are reported.
    pub fn cluster_key(&self) -> String {
        format!("ceph-{}", self.cluster_name)
    }
}

pub fn local_hostname() -> std::io::Result<String> {
    hostname::get().map(|h| h.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_host() -> std::io::Result<String> {
        Ok("node-01".to_string())
    }

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::from_items_with(&[], fixed_host).unwrap();
        assert_eq!(config.cluster_name, "ceph");
        assert_eq!(config.host, "node-01");
        assert_eq!(config.interval, Duration::from_secs(60));
        assert!(!config.verbose);
        assert_eq!(config.cluster_key(), "ceph-ceph");
    }

    #[test]
    fn test_recognized_options_case_insensitive() {
        let items = vec![
            ConfigItem::string("Cluster", "prod"),
            ConfigItem::string("HOST", "mon-a"),
            ConfigItem::number("interval", 15.5),
            ConfigItem::boolean("Verbose", true),
        ];
        let config = ClusterConfig::from_items_with(&items, || {
            panic!("hostname must not be resolved when Host is set")
        })
        .unwrap();
        assert_eq!(config.cluster_name, "prod");
        assert_eq!(config.host, "mon-a");
        assert_eq!(config.interval, Duration::from_secs_f64(15.5));
        assert!(config.verbose);
        assert_eq!(config.cluster_key(), "ceph-prod");
    }

    #[test]
    fn test_unrecognized_option_ignored() {
        let items = vec![
            ConfigItem::string("TestPool", "rbd"),
            ConfigItem::string("Cluster", "backup"),
        ];
        let config = ClusterConfig::from_items_with(&items, fixed_host).unwrap();
        assert_eq!(config.cluster_name, "backup");
    }

    #[test]
    fn test_string_values_coerced() {
        let items = vec![
            ConfigItem::string("Interval", "30"),
            ConfigItem::string("Verbose", "TRUE"),
        ];
        let config = ClusterConfig::from_items_with(&items, fixed_host).unwrap();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = vec![
            vec![ConfigItem::number("Interval", 0.0)],
            vec![ConfigItem::number("Interval", -5.0)],
            vec![ConfigItem::number("Interval", f64::INFINITY)],
            vec![ConfigItem::string("Interval", "soon")],
            vec![ConfigItem::number("Cluster", 1.0)],
            vec![ConfigItem::new("Host", Vec::new())],
            vec![ConfigItem::string("Verbose", "maybe")],
        ];
        for items in cases {
            assert!(
                ClusterConfig::from_items_with(&items, fixed_host).is_err(),
                "{:?} should be rejected",
                items
            );
        }
    }

    #[test]
    fn test_hostname_failure() {
        let err = ClusterConfig::from_items_with(&[], || {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no hostname"))
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Hostname(_)));
    }

    #[test]
    fn test_config_value_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            values: Vec<ConfigValue>,
        }
        let w: Wrapper = toml::from_str("values = [true, 30, 1.5, \"prod\"]").unwrap();
        assert_eq!(
            w.values,
            vec![
                ConfigValue::Boolean(true),
                ConfigValue::Number(30.0),
                ConfigValue::Number(1.5),
                ConfigValue::String("prod".into()),
            ]
        );
    }
}
