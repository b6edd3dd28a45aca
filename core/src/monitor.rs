//! Background monitor
//!
//! Drives [`SceneEngine::tick`] on a fixed interval and, when file watching is
//! enabled, polls the scene log as soon as the filesystem reports a change.
//! Both tasks stop on the shutdown signal; shutdown then runs the final
//! cleanup pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::effects::CleanupReport;
use crate::engine::SceneEngine;
use crate::log_tail::LogWatcher;

pub struct MonitorLoop {
    engine: Arc<SceneEngine>,
    shutdown: watch::Sender<bool>,
    tick_task: JoinHandle<()>,
    watch_task: Option<JoinHandle<()>>,
}

impl MonitorLoop {
    /// Start the monitor tasks on the current tokio runtime.
    pub fn spawn(engine: Arc<SceneEngine>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let period = Duration::from_millis(engine.config().monitor.poll_interval_ms.max(1));

        let tick_task = tokio::spawn(run_ticks(Arc::clone(&engine), period, shutdown_rx.clone()));
        let watch_task = engine
            .config()
            .monitor
            .watch_files
            .then(|| tokio::spawn(run_watcher(Arc::clone(&engine), shutdown_rx)));

        tracing::info!(
            poll_interval_ms = period.as_millis() as u64,
            watching = watch_task.is_some(),
            "Monitor started"
        );
        Self {
            engine,
            shutdown,
            tick_task,
            watch_task,
        }
    }

    pub fn engine(&self) -> &Arc<SceneEngine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        !self.tick_task.is_finished()
    }

    /// Stop both tasks, wait for them, then lift every effect still known.
    pub async fn shutdown(self) -> CleanupReport {
        // Receivers live in the tasks; a send error means they already exited
        let _ = self.shutdown.send(true);
        if let Err(e) = self.tick_task.await {
            tracing::error!(error = %e, "Monitor tick task failed");
        }
        if let Some(task) = self.watch_task
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Monitor watch task failed");
        }
        tracing::info!("Monitor stopped");
        self.engine.shutdown_cleanup()
    }
}

async fn run_ticks(engine: Arc<SceneEngine>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                let report = engine.tick(Instant::now());
                if report.lines > 0 || report.expired > 0 || report.cleanup_ran {
                    tracing::trace!(?report, "Tick");
                }
            }
        }
    }
}

async fn run_watcher(engine: Arc<SceneEngine>, mut shutdown: watch::Receiver<bool>) {
    let (wake_tx, mut wake_rx) = mpsc::channel(1);
    let _watcher = match LogWatcher::start(&engine.log_paths(), wake_tx) {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::warn!(error = %e, "File watching unavailable, relying on polling");
            return;
        }
    };

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            wake = wake_rx.recv() => {
                if wake.is_none() || *shutdown.borrow() {
                    break;
                }
                engine.poll_log(Instant::now());
            }
        }
    }
}
