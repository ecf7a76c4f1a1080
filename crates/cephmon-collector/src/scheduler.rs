//! Periodic scheduling of poll drivers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::driver::PollDriver;

/// Runs each driver on its own interval until shutdown.
///
/// A driver's cycle always runs to completion before its next tick is taken;
/// ticks missed while a cycle was running are skipped, not queued.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Number of scheduled tasks.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Schedule an active driver at its configured interval. Inactive drivers
    /// are not scheduled and `false` is returned.
    pub fn schedule(&mut self, driver: Arc<PollDriver>) -> bool {
        let Some(interval) = driver.interval() else {
            tracing::warn!(plugin = driver.name(), "Plugin is not active, not scheduling it");
            return false;
        };

        tracing::info!(plugin = driver.name(), ?interval, "Scheduling plugin");
        self.spawn_periodic(interval, move || {
            let driver = driver.clone();
            async move {
                driver.read().await;
            }
        });
        true
    }

    pub fn spawn_periodic<F, Fut>(&mut self, interval: Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => { f().await; }
                    _ = rx.changed() => { break; }
                }
            }
        }));
    }

    /// Signal every task to stop and wait for in-flight cycles to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for CTRL+C or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => { tracing::info!("Received CTRL+C"); }
                    _ = sigterm.recv() => { tracing::info!("Received SIGTERM"); }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
            }
        }
    }

    if let Err(e) = ctrl_c.await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
    } else {
        tracing::info!("Received CTRL+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigItem;
    use crate::extractor::MdsExtractor;
    use crate::runner::StaticRunner;
    use cephmon_monitor::InMemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_spawn_periodic_runs_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let c = count.clone();
        scheduler.spawn_periodic(Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
            }
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.shutdown().await;

        let ran = count.load(Ordering::Relaxed);
        assert!(ran >= 2, "ran {} times", ran);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::Relaxed), ran);
    }

    #[tokio::test]
    async fn test_slow_cycles_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let (r, m) = (running.clone(), max_seen.clone());
        scheduler.spawn_periodic(Duration::from_millis(5), move || {
            let (r, m) = (r.clone(), m.clone());
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                r.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.shutdown().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schedule_skips_inactive_driver() {
        let runner = Arc::new(StaticRunner::new());
        let sink = Arc::new(InMemorySink::new());

        let inactive = Arc::new(PollDriver::new(
            Arc::new(MdsExtractor::new(runner.clone())),
            sink.clone(),
        ));
        let mut active = PollDriver::new(Arc::new(MdsExtractor::new(runner.clone())), sink);
        active
            .configure_with(&[ConfigItem::number("Interval", 0.01)], || Ok("h".into()))
            .unwrap();

        let mut scheduler = Scheduler::new();
        assert!(!scheduler.schedule(inactive));
        assert!(scheduler.schedule(Arc::new(active)));
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.shutdown().await;

        // The dump command is unscripted, so every cycle fails, but it is
        // attempted on every tick.
        assert!(runner.calls().len() >= 2);
    }
}
