// src/ingest/worker.rs
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;

use crate::ingest::fetcher::FeedFetcher;
use crate::ingest::normalize::normalize_item;
use crate::ingest::parser::parse_feed;
use crate::ingest::types::{FeedDocument, IngestError, IngestOutcome, IngestReport};
use crate::models::Source;
use crate::store::FeedStore;

/// Fetch → parse → normalize → store for one source, then mark it fetched.
///
/// Cheap to clone; the scheduler hands one copy to every task in a batch.
#[derive(Clone)]
pub struct IngestWorker {
    store: Arc<dyn FeedStore>,
    fetcher: Arc<dyn FeedFetcher>,
}

impl IngestWorker {
    pub fn new(store: Arc<dyn FeedStore>, fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Ingest `source` once. Never fails: fetch and parse errors end up in the
    /// report and the logs, and the freshness mark is written in every case.
    pub async fn ingest(&self, source: &Source) -> IngestReport {
        crate::ingest::ensure_metrics_described();
        let mut report = IngestReport::new(source.id);

        match self.fetch_document(&source.url).await {
            Ok(doc) => {
                tracing::info!(
                    target: "ingest",
                    source_id = %source.id,
                    channel = %doc.channel.title,
                    items = doc.channel.items.len(),
                    "feed fetched"
                );
                self.store_items(source, doc, &mut report).await;
            }
            Err(e) => {
                match &e {
                    IngestError::FetchFailed(cause) => {
                        counter!("ingest_fetch_errors_total").increment(1);
                        report.outcome = IngestOutcome::FetchFailed(cause.clone());
                    }
                    IngestError::ParseFailed(cause) => {
                        counter!("ingest_parse_errors_total").increment(1);
                        report.outcome = IngestOutcome::ParseFailed(cause.clone());
                    }
                }
                tracing::warn!(
                    target: "ingest",
                    source_id = %source.id,
                    url = %source.url,
                    error = %e,
                    "source ingestion failed"
                );
            }
        }

        match self.store.mark_fetched(source.id, Utc::now()).await {
            Ok(_) => report.marked_fetched = true,
            Err(e) => {
                tracing::error!(
                    target: "ingest",
                    source_id = %source.id,
                    error = %e,
                    "could not mark source fetched"
                );
            }
        }

        report
    }

    async fn fetch_document(&self, url: &str) -> Result<FeedDocument, IngestError> {
        let body = self.fetcher.fetch(url).await?;
        parse_feed(&body)
    }

    async fn store_items(&self, source: &Source, doc: FeedDocument, report: &mut IngestReport) {
        for item in doc.channel.items {
            let post = normalize_item(item, source.id);
            match self.store.insert_post(post).await {
                Ok(_) => report.inserted += 1,
                Err(e) if e.is_duplicate() => report.duplicates += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        target: "ingest",
                        source_id = %source.id,
                        error = %e,
                        "post insert failed, skipping item"
                    );
                }
            }
        }

        counter!("ingest_posts_inserted_total").increment(report.inserted as u64);
        counter!("ingest_posts_duplicate_total").increment(report.duplicates as u64);
        counter!("ingest_posts_failed_total").increment(report.failed as u64);
    }
}
