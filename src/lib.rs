// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod api;
pub mod config;
pub mod metrics;
pub mod models;
pub mod service;
pub mod store;
pub mod telemetry;

// Background ingestion: fetch, parse, normalize, store, schedule
pub mod ingest;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::AggregatorConfig;
pub use crate::service::Aggregator;
pub use crate::store::{FeedStore, MemoryStore, StoreError};
