// src/service.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;

use crate::api::{self, AppState};
use crate::config::AggregatorConfig;
use crate::ingest::{HttpFetcher, Scheduler, SchedulerCfg, SchedulerHandle};
use crate::store::{MemoryStore, SnapshotWriter, SnapshotWriterHandle};

/// Store, API and scheduler wired from one [`AggregatorConfig`].
pub struct Aggregator {
    pub config: AggregatorConfig,
    pub store: Arc<MemoryStore>,
}

impl Aggregator {
    /// Build the store, restoring the snapshot when one is configured.
    pub async fn from_config(config: AggregatorConfig) -> Result<Self> {
        let store = match &config.snapshot_path {
            Some(path) => MemoryStore::load_snapshot(path).await?,
            None => MemoryStore::new(),
        };
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            store: self.store.clone(),
            posts_default_limit: self.config.posts_default_limit,
        };
        api::router(state)
    }

    /// Start the ingestion loop against real HTTP origins.
    pub fn spawn_scheduler(&self) -> Result<SchedulerHandle> {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(self.config.fetch_timeout_secs),
            &self.config.user_agent,
        )?;
        let scheduler = Scheduler::new(
            SchedulerCfg::from(&self.config),
            self.store.clone(),
            Arc::new(fetcher),
        );
        Ok(scheduler.spawn())
    }

    /// Keep the snapshot current after every store write. `None` when no
    /// snapshot path is configured.
    pub fn spawn_snapshot_writer(&self) -> Option<SnapshotWriterHandle> {
        let path = self.config.snapshot_path.clone()?;
        Some(SnapshotWriter::new(self.store.clone(), path).spawn())
    }
}
