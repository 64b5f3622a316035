// src/store/mod.rs
pub mod memory;
pub mod writer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewPost, Post, Source};

pub use memory::MemoryStore;
pub use writer::{SnapshotWriter, SnapshotWriterHandle};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Uniqueness rejections are expected during re-ingestion and are not
    /// treated as failures by the ingest worker.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// Storage operations the ingestion core depends on.
///
/// Implementations are shared by every concurrent worker in a batch and must
/// serialize or isolate their own writes.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Up to `limit` sources, least recently fetched first. Sources that were
    /// never fetched come before any fetched one.
    async fn select_stale_sources(&self, limit: usize) -> Result<Vec<Source>, StoreError>;

    /// Record an ingestion attempt for `source_id` at `at`.
    async fn mark_fetched(&self, source_id: Uuid, at: DateTime<Utc>)
        -> Result<Source, StoreError>;

    /// Insert one post. Rejects a second post with the same link for the same
    /// source with [`StoreError::Duplicate`].
    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError>;
}
