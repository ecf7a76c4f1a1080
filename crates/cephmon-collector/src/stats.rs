//! Nested stats produced by an extractor and their flattening into samples.

use cephmon_monitor::MetricSample;
use std::collections::BTreeMap;
use std::fmt;

/// A leaf value as the extractor found it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    /// Unvalidated text, converted at dispatch time.
    Text(String),
}

impl RawValue {
    /// The value as a finite number. NaN and infinities are not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().parse().ok()?,
        };
        n.is_finite().then_some(n)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<usize> for RawValue {
    fn from(n: usize) -> Self {
        RawValue::Number(n as f64)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Number(if b { 1.0 } else { 0.0 })
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatsNode {
    Value(RawValue),
    Group(BTreeMap<String, StatsNode>),
}

/// Stats from one cycle: cluster key → instance key(s) → metric → value.
///
/// Keys are kept sorted so the dispatch order does not depend on how the
/// extractor gathered them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    clusters: BTreeMap<String, BTreeMap<String, StatsNode>>,
}

/// Samples of one `(cluster, instance_path)` group, or the reason it was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceSamples {
    Complete(Vec<MetricSample>),
    Dropped {
        cluster: String,
        instance_path: Vec<String>,
        metric: String,
        value: RawValue,
    },
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `metric = value` under `cluster` and the given instance path,
    /// creating intermediate groups. A leaf already sitting where a group is
    /// needed is replaced.
    pub fn insert(
        &mut self,
        cluster: &str,
        instance_path: &[&str],
        metric: &str,
        value: impl Into<RawValue>,
    ) {
        let mut level = self.clusters.entry(cluster.to_string()).or_default();
        for key in instance_path {
            let node = level
                .entry(key.to_string())
                .or_insert_with(|| StatsNode::Group(BTreeMap::new()));
            if let StatsNode::Value(_) = node {
                *node = StatsNode::Group(BTreeMap::new());
            }
            let StatsNode::Group(children) = node else {
                return;
            };
            level = children;
        }
        level.insert(metric.to_string(), StatsNode::Value(value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.values().all(|c| c.is_empty())
    }

    pub fn get(&self, cluster: &str, instance_path: &[&str], metric: &str) -> Option<&RawValue> {
        let mut level = self.clusters.get(cluster)?;
        for key in instance_path {
            match level.get(*key)? {
                StatsNode::Group(children) => level = children,
                StatsNode::Value(_) => return None,
            }
        }
        match level.get(metric)? {
            StatsNode::Value(v) => Some(v),
            StatsNode::Group(_) => None,
        }
    }

    /// Names of the instances directly under `cluster`.
    pub fn instances(&self, cluster: &str) -> Vec<&str> {
        self.clusters
            .get(cluster)
            .map(|c| c.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Flatten into gauge samples, one group per `(cluster, instance_path)`.
    ///
    /// A group whose leaves do not all convert to numbers is dropped as a
    /// whole, so a half-parsed instance never reaches the sink.
    pub fn flatten(&self) -> Vec<InstanceSamples> {
        let mut out = Vec::new();
        for (cluster, nodes) in &self.clusters {
            let mut path = Vec::new();
            flatten_level(cluster, &mut path, nodes, &mut out);
        }
        out
    }
}

fn flatten_level(
    cluster: &str,
    path: &mut Vec<String>,
    nodes: &BTreeMap<String, StatsNode>,
    out: &mut Vec<InstanceSamples>,
) {
    let mut samples = Vec::new();
    let mut dropped = None;

    for (key, node) in nodes {
        match node {
            StatsNode::Value(raw) => {
                if dropped.is_some() {
                    continue;
                }
                match raw.as_f64() {
                    Some(value) => samples.push(MetricSample::gauge(
                        cluster,
                        path.clone(),
                        key.as_str(),
                        value,
                    )),
                    None => {
                        dropped = Some(InstanceSamples::Dropped {
                            cluster: cluster.to_string(),
                            instance_path: path.clone(),
                            metric: key.clone(),
                            value: raw.clone(),
                        })
                    }
                }
            }
            StatsNode::Group(children) => {
                path.push(key.clone());
                flatten_level(cluster, path, children, out);
                path.pop();
            }
        }
    }

    if let Some(dropped) = dropped {
        out.push(dropped);
    } else if !samples.is_empty() {
        out.push(InstanceSamples::Complete(samples));
    }
}
