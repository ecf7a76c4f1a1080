//! The shared poll driver.
//!
//! A driver starts `Unconfigured`, is configured exactly once and is then
//! `Active` for the rest of its life. A configuration failure leaves it
//! `Disabled`: it keeps answering reads but never runs its extractor.

use cephmon_monitor::MetricsSink;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ClusterConfig, ConfigItem};
use crate::error::ConfigError;
use crate::extractor::Extractor;
use crate::stats::{ExtractionResult, InstanceSamples};

#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    Unconfigured,
    Active(ClusterConfig),
    Disabled(String),
}

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The driver is not active; the extractor was not run.
    Inactive,
    /// The extractor returned nothing; no values were dispatched.
    NoData,
    Published {
        samples: usize,
        dropped_instances: usize,
    },
    /// The extraction task panicked or was cancelled.
    Aborted,
}

pub struct PollDriver {
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn MetricsSink>,
    state: DriverState,
}

impl PollDriver {
    pub fn new(extractor: Arc<dyn Extractor>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            extractor,
            sink,
            state: DriverState::Unconfigured,
        }
    }

    pub fn name(&self) -> &'static str {
        self.extractor.name()
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn config(&self) -> Option<&ClusterConfig> {
        match &self.state {
            DriverState::Active(config) => Some(config),
            _ => None,
        }
    }

    /// Apply plugin options. Only the first call has any effect.
    pub fn configure(&mut self, items: &[ConfigItem]) -> Result<ClusterConfig, ConfigError> {
        self.configure_with(items, crate::config::local_hostname)
    }

    pub fn configure_with<F>(
        &mut self,
        items: &[ConfigItem],
        resolve_host: F,
    ) -> Result<ClusterConfig, ConfigError>
    where
        F: FnOnce() -> std::io::Result<String>,
    {
        if self.state != DriverState::Unconfigured {
            return Err(ConfigError::AlreadyConfigured);
        }

        match ClusterConfig::from_items_with(items, resolve_host) {
            Ok(config) => {
                tracing::info!(
                    plugin = self.name(),
                    cluster = %config.cluster_name,
                    host = %config.host,
                    interval = ?config.interval,
                    verbose = config.verbose,
                    "Plugin configured"
                );
                self.state = DriverState::Active(config.clone());
                Ok(config)
            }
            Err(e) => {
                self.state = DriverState::Disabled(e.to_string());
                Err(e)
            }
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.config().map(|c| c.interval)
    }

    /// Run one poll cycle: collect, flatten, dispatch.
    ///
    /// Never fails. Anything that goes wrong is logged and shows up only as
    /// missing values.
    pub async fn read(&self) -> CycleOutcome {
        let config = match &self.state {
            DriverState::Active(config) => config.clone(),
            state => {
                tracing::debug!(plugin = self.name(), ?state, "Skipping read of inactive plugin");
                return CycleOutcome::Inactive;
            }
        };

        let started = Instant::now();
        let extractor = self.extractor.clone();
        let task_config = config.clone();
        let collected =
            tokio::spawn(async move { extractor.collect(&task_config).await }).await;

        let result = match collected {
            Ok(Some(result)) if !result.is_empty() => result,
            Ok(_) => {
                verbose!(
                    config,
                    plugin = self.name(),
                    elapsed = ?started.elapsed(),
                    "No values collected this cycle"
                );
                return CycleOutcome::NoData;
            }
            Err(e) => {
                tracing::error!(
                    plugin = self.name(),
                    cluster = %config.cluster_name,
                    panicked = e.is_panic(),
                    error = %e,
                    "Collection cycle aborted"
                );
                return CycleOutcome::Aborted;
            }
        };

        let outcome = self.dispatch(&config, &result);
        verbose!(
            config,
            plugin = self.name(),
            elapsed = ?started.elapsed(),
            ?outcome,
            "Cycle complete"
        );
        outcome
    }

    /// Flatten `result` and send every complete instance to the sink.
    pub fn dispatch(&self, config: &ClusterConfig, result: &ExtractionResult) -> CycleOutcome {
        let mut samples = 0;
        let mut dropped_instances = 0;

        for group in result.flatten() {
            match group {
                InstanceSamples::Complete(group) => {
                    for sample in &group {
                        match self.sink.dispatch(&config.host, config.interval, sample) {
                            Ok(()) => samples += 1,
                            Err(e) => {
                                tracing::error!(
                                    plugin = self.name(),
                                    metric = %sample.metric_name,
                                    instance = %sample.plugin_instance(),
                                    error = %e,
                                    "Failed to dispatch value"
                                );
                            }
                        }
                    }
                }
                InstanceSamples::Dropped {
                    cluster,
                    instance_path,
                    metric,
                    value,
                } => {
                    dropped_instances += 1;
                    tracing::error!(
                        plugin = self.name(),
                        cluster = %cluster,
                        instance = %instance_path.join("."),
                        metric = %metric,
                        value = %value,
                        "Value is not numeric, dropping the whole instance"
                    );
                }
            }
        }

        CycleOutcome::Published {
            samples,
            dropped_instances,
        }
    }
}
