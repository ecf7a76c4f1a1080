use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use cephmon_collector::{
    wait_for_shutdown_signal, CollectorConfig, CommandRunner, PollDriver, Scheduler, ShellRunner,
    SinkKind,
};
use cephmon_monitor::{JsonLinesSink, LogSink, MetricsSink, PutvalSink};

/// Ceph metrics collector
///
/// Periodically runs the ceph and rados CLIs, derives pool latency, mds count
/// and monitor quorum/health metrics, and publishes them to the configured
/// sink.
#[derive(Parser, Debug)]
#[command(name = "cephmon-collector", version, about)]
struct Args {
    /// Path to configuration file. Without one, all plugins run with defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,

    /// Run a single cycle of every plugin and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn build_sink(config: &CollectorConfig) -> anyhow::Result<Arc<dyn MetricsSink>> {
    let sink: Arc<dyn MetricsSink> = match config.sink.kind {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::Putval => Arc::new(PutvalSink::stdout()),
        SinkKind::Jsonl => Arc::new(
            JsonLinesSink::open(&config.sink.path)
                .with_context(|| format!("opening {}", config.sink.path.display()))?,
        ),
    };
    Ok(sink)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", CollectorConfig::default().to_toml()?);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => CollectorConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CollectorConfig::default(),
    };

    let _log_guard = cephmon_logging::init_logging(&config.logging.clone().verbose(args.verbose))?;

    tracing::info!(
        config = ?args.config,
        plugins = config.plugins.len(),
        sink = ?config.sink.kind,
        "Starting cephmon collector"
    );

    let sink = build_sink(&config)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());
    let drivers: Vec<Arc<PollDriver>> = config
        .build_drivers(runner, sink)
        .into_iter()
        .map(Arc::new)
        .collect();

    if args.once {
        for driver in &drivers {
            let outcome = driver.read().await;
            tracing::info!(plugin = driver.name(), ?outcome, "Cycle finished");
        }
        return Ok(());
    }

    let mut scheduler = Scheduler::new();
    for driver in drivers {
        scheduler.schedule(driver);
    }
    if scheduler.is_empty() {
        tracing::warn!("No plugin is active, nothing will be collected");
    }

    tracing::info!("Collector initialization complete");
    wait_for_shutdown_signal().await;
    tracing::info!("Collector shutting down");
    scheduler.shutdown().await;

    Ok(())
}
