//! Sink backends that receive dispatched samples.
//!
//! - `LogSink`: logs samples via `tracing`.
//! - `PutvalSink`: writes collectd exec-plugin `PUTVAL` lines.
//! - `JsonLinesSink`: appends JSON objects to a file.
//! - `InMemorySink`: stores samples in memory for testing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::sample::MetricSample;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize sample: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receiver of dispatched metric values.
///
/// The plugin name is the sample's cluster key and the plugin instance is its
/// joined instance path. `interval` is how often the plugin reports, so a
/// consumer can tell a late value from a missing one. Sinks only forward;
/// nothing is persisted by the collector itself.
pub trait MetricsSink: Send + Sync {
    fn dispatch(&self, host: &str, interval: Duration, sample: &MetricSample)
        -> Result<(), SinkError>;
}

pub struct LogSink;

impl MetricsSink for LogSink {
    fn dispatch(
        &self,
        host: &str,
        interval: Duration,
        sample: &MetricSample,
    ) -> Result<(), SinkError> {
        tracing::info!(
            host,
            ?interval,
            plugin = %sample.plugin(),
            plugin_instance = %sample.plugin_instance(),
            metric = %sample.metric_name,
            kind = %sample.kind,
            value = sample.value,
            "metric sample"
        );
        Ok(())
    }
}

/// Writes samples in the collectd plain-text protocol understood by the exec
/// plugin:
///
/// ```text
/// PUTVAL "host/ceph-prod-mon/gauge-quorum" interval=60 N:2
/// ```
///
/// `/` and control characters inside a field are replaced with `_`, and `"`
/// and `\` are backslash-escaped inside the quoted identifier.
pub struct PutvalSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl PutvalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> PutvalSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn identifier(host: &str, sample: &MetricSample) -> String {
        let instance = sample.plugin_instance();
        let plugin = if instance.is_empty() {
            identifier_field(sample.plugin())
        } else {
            format!(
                "{}-{}",
                identifier_field(sample.plugin()),
                identifier_field(&instance)
            )
        };
        let id = format!(
            "{}/{}/{}-{}",
            identifier_field(host),
            plugin,
            sample.kind,
            identifier_field(&sample.metric_name)
        );
        id.replace('\\', "\\\\").replace('"', "\\\"")
    }
}

fn identifier_field(field: &str) -> String {
    field
        .chars()
        .map(|c| if c == '/' || c.is_control() { '_' } else { c })
        .collect()
}

impl<W: Write + Send> MetricsSink for PutvalSink<W> {
    fn dispatch(
        &self,
        host: &str,
        interval: Duration,
        sample: &MetricSample,
    ) -> Result<(), SinkError> {
        let mut writer = self.writer.lock();
        writeln!(
            writer,
            "PUTVAL \"{}\" interval={} N:{}",
            Self::identifier(host, sample),
            interval.as_secs_f64(),
            sample.value
        )?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: DateTime<Utc>,
    host: &'a str,
    interval: f64,
    plugin: &'a str,
    plugin_instance: String,
    #[serde(rename = "type")]
    kind: &'a str,
    type_instance: &'a str,
    value: f64,
}

/// Appends one JSON object per sample to a file.
pub struct JsonLinesSink {
    file: Mutex<fs::File>,
}

impl JsonLinesSink {
    /// Open (or create) the target file, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl MetricsSink for JsonLinesSink {
    fn dispatch(
        &self,
        host: &str,
        interval: Duration,
        sample: &MetricSample,
    ) -> Result<(), SinkError> {
        let record = JsonRecord {
            timestamp: Utc::now(),
            host,
            interval: interval.as_secs_f64(),
            plugin: sample.plugin(),
            plugin_instance: sample.plugin_instance(),
            kind: sample.kind.as_str(),
            type_instance: &sample.metric_name,
            value: sample.value,
        };
        let json = serde_json::to_string(&record)?;
        writeln!(self.file.lock(), "{}", json)?;
        Ok(())
    }
}

/// Stores dispatched samples in memory for testing and inspection.
pub struct InMemorySink {
    samples: Mutex<Vec<(String, MetricSample)>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Take all stored `(host, sample)` pairs, leaving the buffer empty.
    pub fn take_samples(&self) -> Vec<(String, MetricSample)> {
        std::mem::take(&mut *self.samples.lock())
    }

    pub fn count(&self) -> usize {
        self.samples.lock().len()
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for InMemorySink {
    fn dispatch(
        &self,
        host: &str,
        _interval: Duration,
        sample: &MetricSample,
    ) -> Result<(), SinkError> {
        self.samples.lock().push((host.to_string(), sample.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(60);

    fn quorum_sample() -> MetricSample {
        MetricSample::gauge("ceph-prod", vec!["mon".into()], "quorum", 2.0)
    }

    #[test]
    fn test_log_sink() {
        assert!(LogSink.dispatch("host-01", INTERVAL, &quorum_sample()).is_ok());
    }

    #[test]
    fn test_putval_format() {
        let sink = PutvalSink::new(Vec::new());
        sink.dispatch("host-01", INTERVAL, &quorum_sample()).unwrap();
        sink.dispatch(
            "host-01",
            INTERVAL,
            &MetricSample::gauge("ceph-prod", vec!["rbd".into()], "avg_latency", 1.25),
        )
        .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "PUTVAL \"host-01/ceph-prod-mon/gauge-quorum\" interval=60 N:2",
                "PUTVAL \"host-01/ceph-prod-rbd/gauge-avg_latency\" interval=60 N:1.25",
            ]
        );
    }

    #[test]
    fn test_putval_without_instance() {
        let sink = PutvalSink::new(Vec::new());
        sink.dispatch("h", INTERVAL, &MetricSample::gauge("ceph-a", Vec::new(), "up", 1.0))
            .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "PUTVAL \"h/ceph-a/gauge-up\" interval=60 N:1\n");
    }

    #[test]
    fn test_putval_interval_and_escaping() {
        let sink = PutvalSink::new(Vec::new());
        sink.dispatch(
            "host-01",
            Duration::from_millis(15_500),
            &MetricSample::gauge("ceph-prod", vec!["a/b\"c\\d".into()], "avg_latency", 1.0),
        )
        .unwrap();
        sink.dispatch(
            "host-01",
            INTERVAL,
            &MetricSample::gauge("ceph-prod", vec!["line\nbreak".into()], "min_latency", 0.5),
        )
        .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"PUTVAL "host-01/ceph-prod-a_b\"c\\d/gauge-avg_latency" interval=15.5 N:1"#,
                r#"PUTVAL "host-01/ceph-prod-line_break/gauge-min_latency" interval=60 N:0.5"#,
            ]
        );
    }

    #[test]
    fn test_json_lines_sink() {
        let dir = std::env::temp_dir().join("cephmon-test-json-lines-sink");
        let _ = fs::remove_dir_all(&dir);

        let path = dir.join("metrics.jsonl");
        let sink = JsonLinesSink::open(&path).unwrap();
        sink.dispatch("host-01", INTERVAL, &quorum_sample()).unwrap();
        sink.dispatch("host-01", INTERVAL, &quorum_sample()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["host"], "host-01");
        assert_eq!(v["interval"], 60.0);
        assert_eq!(v["plugin"], "ceph-prod");
        assert_eq!(v["plugin_instance"], "mon");
        assert_eq!(v["type"], "gauge");
        assert_eq!(v["type_instance"], "quorum");
        assert_eq!(v["value"], 2.0);
        assert!(v.get("timestamp").is_some());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_in_memory_sink() {
        let sink = InMemorySink::new();
        sink.dispatch("a", INTERVAL, &quorum_sample()).unwrap();
        sink.dispatch("b", INTERVAL, &quorum_sample()).unwrap();
        assert_eq!(sink.count(), 2);

        let taken = sink.take_samples();
        assert_eq!(taken[0].0, "a");
        assert_eq!(taken[1].1, quorum_sample());
        assert_eq!(sink.count(), 0);
    }
}
