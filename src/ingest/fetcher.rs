// src/ingest/fetcher.rs
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use metrics::histogram;
use reqwest::{header::CONTENT_TYPE, Client};

use crate::ingest::types::IngestError;

/// The only media type accepted from a feed origin.
pub const ACCEPTED_CONTENT_TYPE: &str = "application/xml";

/// Retrieves the raw body of one feed.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError>;
}

/// HTTP retrieval with a per-request deadline. No retries: a failed source is
/// picked up again by a later tick.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        let t0 = std::time::Instant::now();
        tracing::debug!(target: "ingest", %url, "fetching feed");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::FetchFailed(format!("GET {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::FetchFailed(format!(
                "status {status} from {url}"
            )));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_accepted_content_type(&content_type) {
            return Err(IngestError::FetchFailed(format!(
                "invalid content-type {content_type:?} from {url}"
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| IngestError::FetchFailed(format!("reading body of {url}: {e}")))?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_fetch_ms").record(ms);
        Ok(body.to_vec())
    }
}

/// Compares the media type only, ignoring parameters such as `charset`.
fn is_accepted_content_type(header: &str) -> bool {
    let media = header.split(';').next().unwrap_or_default().trim();
    media.eq_ignore_ascii_case(ACCEPTED_CONTENT_TYPE)
}
