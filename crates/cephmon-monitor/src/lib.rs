//! Metric samples and the sinks that receive them.
//!
//! A collection cycle flattens its extraction result into `MetricSample`s and
//! hands each one, together with the configured host label, to a
//! `MetricsSink`.

pub mod sample;
pub mod sink;

pub use sample::{MetricKind, MetricSample};
pub use sink::{InMemorySink, JsonLinesSink, LogSink, MetricsSink, PutvalSink, SinkError};
