//! Keeps the on-disk snapshot in step with a [`MemoryStore`].
//!
//! The process may be killed without running any shutdown code, so every
//! write is flushed as it lands instead of once at exit.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::MemoryStore;

pub struct SnapshotWriter {
    store: Arc<MemoryStore>,
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(store: Arc<MemoryStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    /// Start writing on the current runtime.
    ///
    /// Dropping the returned handle stops the task after one last save.
    pub fn spawn(self) -> SnapshotWriterHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        // writes after this point are flushed even if the task starts late
        let saved = self.store.revision();
        let task = tokio::spawn(self.run(saved, stop_rx));
        SnapshotWriterHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(self, mut saved: u64, mut stop: watch::Receiver<bool>) {
        tracing::info!(target: "store", path = %self.path.display(), "snapshot writer started");

        loop {
            tokio::select! {
                _ = self.store.changed() => {}
                _ = stop.changed() => break,
            }
            self.save_if_changed(&mut saved).await;
        }

        self.save_if_changed(&mut saved).await;
        tracing::info!(target: "store", "snapshot writer stopped");
    }

    async fn save_if_changed(&self, saved: &mut u64) {
        // read first: writes racing the save bump it again and trigger another pass
        let revision = self.store.revision();
        if revision == *saved {
            return;
        }
        match self.store.save_snapshot(&self.path).await {
            Ok(()) => {
                *saved = revision;
                tracing::debug!(target: "store", revision, "snapshot saved");
            }
            Err(e) => {
                tracing::error!(target: "store", error = %format!("{e:#}"), "snapshot save failed");
            }
        }
    }
}

/// Owns the running writer task.
pub struct SnapshotWriterHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SnapshotWriterHandle {
    /// Flush any pending write and stop.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(target: "store", error = %e, "snapshot writer ended abnormally");
        }
    }
}
