// tests/ingest_worker.rs
mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use common::{MALFORMED_XML, THREE_ITEMS_XML};
use rss_aggregator::ingest::{FeedFetcher, IngestError, IngestOutcome, IngestWorker};
use rss_aggregator::models::{NewPost, Post, Source};
use rss_aggregator::{FeedStore, MemoryStore, StoreError};

/// Serves canned results per URL and records every request.
struct StubFetcher {
    responses: HashMap<String, Result<Vec<u8>, IngestError>>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    fn new(responses: Vec<(&str, Result<&str, IngestError>)>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|(url, r)| (url.to_string(), r.map(|s| s.as_bytes().to_vec())))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FeedFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        self.calls.lock().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(IngestError::FetchFailed(format!("no stub for {url}"))))
    }
}

/// Delegates to a `MemoryStore` but rejects chosen links and, optionally,
/// every freshness write.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    reject_links: Vec<String>,
    fail_mark: bool,
}

#[async_trait]
impl FeedStore for FlakyStore {
    async fn select_stale_sources(&self, limit: usize) -> Result<Vec<Source>, StoreError> {
        self.inner.select_stale_sources(limit).await
    }

    async fn mark_fetched(&self, source_id: Uuid, at: DateTime<Utc>) -> Result<Source, StoreError> {
        if self.fail_mark {
            return Err(StoreError::Backend("freshness write refused".into()));
        }
        self.inner.mark_fetched(source_id, at).await
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError> {
        if self.reject_links.contains(&post.url) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.insert_post(post).await
    }
}

fn seeded_store(url: &str) -> (Arc<MemoryStore>, Source) {
    let store = Arc::new(MemoryStore::new());
    let user = store.create_user("reader").unwrap();
    let source = store.create_source("blog", url, user.id).unwrap();
    (store, source)
}

#[tokio::test]
async fn stores_every_item_then_marks_fetched() {
    let url = "https://blog.example.test/rss";
    let (store, source) = seeded_store(url);
    let fetcher = Arc::new(StubFetcher::new(vec![(url, Ok(THREE_ITEMS_XML))]));
    let worker = IngestWorker::new(store.clone(), fetcher.clone());

    let before = Utc::now();
    let report = worker.ingest(&source).await;

    assert_eq!(report.outcome, IngestOutcome::Stored);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.duplicates, 0);
    assert!(report.marked_fetched);
    assert_eq!(fetcher.calls.lock().as_slice(), [url.to_string()]);

    let posts = store.posts_for_source(source.id).unwrap();
    assert_eq!(posts.len(), 3);
    let undated = posts.iter().find(|p| p.title == "Undated draft").unwrap();
    assert_eq!(undated.published_at, None);
    assert_eq!(undated.description, None);

    let fetched_at = store.source(source.id).unwrap().last_fetched_at.unwrap();
    assert!(fetched_at >= before);
}

#[tokio::test]
async fn fetch_failure_still_marks_fetched() {
    let url = "https://down.example.test/rss";
    let (store, source) = seeded_store(url);
    let fetcher = Arc::new(StubFetcher::new(vec![(
        url,
        Err(IngestError::FetchFailed("status 503".into())),
    )]));
    let worker = IngestWorker::new(store.clone(), fetcher);

    let report = worker.ingest(&source).await;

    assert_eq!(report.outcome, IngestOutcome::FetchFailed("status 503".into()));
    assert_eq!(report.inserted, 0);
    assert!(report.marked_fetched);
    assert!(store.source(source.id).unwrap().last_fetched_at.is_some());
    assert!(store.posts_for_source(source.id).unwrap().is_empty());
}

#[tokio::test]
async fn parse_failure_still_marks_fetched() {
    let url = "https://broken.example.test/rss";
    let (store, source) = seeded_store(url);
    let fetcher = Arc::new(StubFetcher::new(vec![(url, Ok(MALFORMED_XML))]));
    let worker = IngestWorker::new(store.clone(), fetcher);

    let report = worker.ingest(&source).await;

    assert!(matches!(report.outcome, IngestOutcome::ParseFailed(_)));
    assert!(report.marked_fetched);
    assert!(store.source(source.id).unwrap().last_fetched_at.is_some());
    assert!(store.posts_for_source(source.id).unwrap().is_empty());
}

#[tokio::test]
async fn reingesting_the_same_feed_creates_no_duplicates() {
    let url = "https://blog.example.test/rss";
    let (store, source) = seeded_store(url);
    let fetcher = Arc::new(StubFetcher::new(vec![(url, Ok(THREE_ITEMS_XML))]));
    let worker = IngestWorker::new(store.clone(), fetcher);

    let first = worker.ingest(&source).await;
    let second = worker.ingest(&source).await;

    assert_eq!(first.inserted, 3);
    assert_eq!(second.outcome, IngestOutcome::Stored);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(second.failed, 0);
    assert_eq!(store.posts_for_source(source.id).unwrap().len(), 3);
}

#[tokio::test]
async fn one_rejected_item_does_not_block_siblings() {
    let url = "https://blog.example.test/rss";
    let (inner, source) = seeded_store(url);
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        reject_links: vec!["https://blog.example.test/posts/xml".into()],
        fail_mark: false,
    });
    let fetcher = Arc::new(StubFetcher::new(vec![(url, Ok(THREE_ITEMS_XML))]));
    let worker = IngestWorker::new(store, fetcher);

    let report = worker.ingest(&source).await;

    assert_eq!(report.outcome, IngestOutcome::Stored);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failed, 1);
    assert!(report.marked_fetched);
    let links: Vec<String> = inner
        .posts_for_source(source.id)
        .unwrap()
        .into_iter()
        .map(|p| p.url)
        .collect();
    assert!(!links.contains(&"https://blog.example.test/posts/xml".to_string()));
    assert_eq!(links.len(), 2);
}

#[tokio::test]
async fn failed_freshness_write_is_reported_not_raised() {
    let url = "https://blog.example.test/rss";
    let (inner, source) = seeded_store(url);
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        reject_links: vec![],
        fail_mark: true,
    });
    let fetcher = Arc::new(StubFetcher::new(vec![(url, Ok(THREE_ITEMS_XML))]));
    let worker = IngestWorker::new(store, fetcher);

    let report = worker.ingest(&source).await;

    assert_eq!(report.inserted, 3);
    assert!(!report.marked_fetched);
    assert_eq!(inner.source(source.id).unwrap().last_fetched_at, None);
}
