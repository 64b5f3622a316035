// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::AggregatorConfig;
use crate::ingest::fetcher::FeedFetcher;
use crate::ingest::types::IngestReport;
use crate::ingest::worker::IngestWorker;
use crate::store::{FeedStore, StoreError};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub batch_size: usize,
    pub shutdown_grace: Duration,
}

impl From<&AggregatorConfig> for SchedulerCfg {
    fn from(cfg: &AggregatorConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs),
            batch_size: cfg.batch_size,
            shutdown_grace: Duration::from_secs(cfg.shutdown_grace_secs),
        }
    }
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub inserted: usize,
    pub reports: Vec<IngestReport>,
}

impl TickSummary {
    fn record(&mut self, report: IngestReport) {
        if report.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.inserted += report.inserted;
        self.reports.push(report);
    }
}

/// Periodically ingests the least recently fetched sources, one batch at a
/// time.
pub struct Scheduler {
    cfg: SchedulerCfg,
    store: Arc<dyn FeedStore>,
    worker: IngestWorker,
}

impl Scheduler {
    pub fn new(cfg: SchedulerCfg, store: Arc<dyn FeedStore>, fetcher: Arc<dyn FeedFetcher>) -> Self {
        let cfg = SchedulerCfg {
            interval: cfg.interval.max(Duration::from_millis(1)),
            batch_size: cfg.batch_size.max(1),
            ..cfg
        };
        let worker = IngestWorker::new(store.clone(), fetcher);
        Self { cfg, store, worker }
    }

    /// Select one batch, ingest every source in it concurrently and wait for
    /// all of them. Only the batch query itself can fail.
    pub async fn run_tick(&self) -> Result<TickSummary, StoreError> {
        crate::ingest::ensure_metrics_described();

        let sources = self.store.select_stale_sources(self.cfg.batch_size).await?;
        gauge!("scheduler_batch_size").set(sources.len() as f64);
        tracing::info!(target: "ingest", count = sources.len(), "fetching feeds");

        let mut summary = TickSummary {
            selected: sources.len(),
            ..TickSummary::default()
        };

        let mut tasks = JoinSet::new();
        for source in sources {
            let worker = self.worker.clone();
            tasks.spawn(async move { worker.ingest(&source).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => summary.record(report),
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(target: "ingest", error = %e, "ingest task panicked");
                }
            }
        }

        Ok(summary)
    }

    /// Start the loop on the current runtime. The first tick runs immediately.
    ///
    /// Dropping the returned handle without calling
    /// [`SchedulerHandle::shutdown`] also stops the loop.
    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        SchedulerHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.cfg.interval);
        // A slow batch delays the next one instead of causing a burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            target: "ingest",
            interval_ms = self.cfg.interval.as_millis() as u64,
            batch_size = self.cfg.batch_size,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }

            let tick = self.run_tick();
            tokio::pin!(tick);

            tokio::select! {
                result = &mut tick => log_tick(result),
                _ = stop.changed() => {
                    match tokio::time::timeout(self.cfg.shutdown_grace, &mut tick).await {
                        Ok(result) => log_tick(result),
                        Err(_) => tracing::warn!(
                            target: "ingest",
                            grace_ms = self.cfg.shutdown_grace.as_millis() as u64,
                            "shutdown grace elapsed, abandoning in-flight batch"
                        ),
                    }
                    break;
                }
            }
        }

        tracing::info!(target: "ingest", "scheduler stopped");
    }
}

fn log_tick(result: Result<TickSummary, StoreError>) {
    match result {
        Ok(summary) => {
            counter!("scheduler_ticks_total").increment(1);
            gauge!("scheduler_last_tick_ts").set(chrono::Utc::now().timestamp() as f64);
            tracing::info!(
                target: "ingest",
                fetched = summary.selected,
                succeeded = summary.succeeded,
                failed = summary.failed,
                inserted = summary.inserted,
                "finished processing feeds"
            );
        }
        Err(e) => {
            counter!("scheduler_tick_errors_total").increment(1);
            tracing::warn!(target: "ingest", error = %e, "could not select feeds, skipping tick");
        }
    }
}

/// Owns the running scheduler task.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for it. An in-flight batch gets the
    /// configured grace period before it is abandoned.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(target: "ingest", error = %e, "scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
