// src/ingest/types.rs
use thiserror::Error;
use uuid::Uuid;

/// Failures that abort one source's ingestion for the current tick.
///
/// Item-level problems (unparseable dates, rejected inserts) never surface as
/// an `IngestError`; the worker absorbs them per item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),
}

/// A publish date matched none of the known layouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized publish date: {0:?}")]
pub struct DateParseFailed(pub String);

/// Parsed RSS document. Every text field is an opaque string from the markup;
/// missing elements become empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RawItem>,
}

/// One `<item>`; `pub_date` holds the raw `<pubDate>` text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    FetchFailed(String),
    ParseFailed(String),
}

/// What one worker invocation did for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source_id: Uuid,
    pub outcome: IngestOutcome,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub marked_fetched: bool,
}

impl IngestReport {
    pub(crate) fn new(source_id: Uuid) -> Self {
        Self {
            source_id,
            outcome: IngestOutcome::Stored,
            inserted: 0,
            duplicates: 0,
            failed: 0,
            marked_fetched: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == IngestOutcome::Stored
    }
}
