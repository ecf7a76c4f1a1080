use serde::{Deserialize, Serialize};
use std::fmt;

/// Data source type of a dispatched value, named after the collectd types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
    Derive,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Derive => "derive",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value produced by a poll cycle.
///
/// Samples are built by flattening an extraction result and handed straight
/// to a sink; they are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Cluster key, e.g. `ceph-prod`. Reported as the plugin name.
    pub cluster: String,
    /// Keys between the cluster and the metric, e.g. `["mon"]` or a pool name.
    pub instance_path: Vec<String>,
    pub metric_name: String,
    pub value: f64,
    pub kind: MetricKind,
}

impl MetricSample {
    pub fn gauge(
        cluster: impl Into<String>,
        instance_path: Vec<String>,
        metric_name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            instance_path,
            metric_name: metric_name.into(),
            value,
            kind: MetricKind::Gauge,
        }
    }

    pub fn plugin(&self) -> &str {
        &self.cluster
    }

    /// Instance path joined with `.`; empty when the metric sits directly
    /// under the cluster key.
    pub fn plugin_instance(&self) -> String {
        self.instance_path.join(".")
    }
}
