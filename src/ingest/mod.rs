// src/ingest/mod.rs
pub mod fetcher;
pub mod normalize;
pub mod parser;
pub mod scheduler;
pub mod types;
pub mod worker;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use fetcher::{FeedFetcher, HttpFetcher};
pub use scheduler::{Scheduler, SchedulerCfg, SchedulerHandle, TickSummary};
pub use types::{FeedDocument, IngestError, IngestOutcome, IngestReport, RawItem};
pub use worker::IngestWorker;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_fetch_errors_total",
            "Sources whose fetch failed (network, status, content-type, body)."
        );
        describe_counter!(
            "ingest_parse_errors_total",
            "Sources whose body was not a well-formed feed."
        );
        describe_counter!("ingest_posts_inserted_total", "Posts stored by ingestion.");
        describe_counter!(
            "ingest_posts_duplicate_total",
            "Posts skipped because the store already had them."
        );
        describe_counter!(
            "ingest_posts_failed_total",
            "Posts skipped after a non-duplicate store error."
        );
        describe_histogram!("ingest_fetch_ms", "Feed fetch time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("scheduler_ticks_total", "Completed scheduler ticks.");
        describe_counter!(
            "scheduler_tick_errors_total",
            "Ticks skipped because the batch could not be selected."
        );
        describe_gauge!("scheduler_batch_size", "Sources selected by the last tick.");
        describe_gauge!(
            "scheduler_last_tick_ts",
            "Unix ts when the scheduler last completed a tick."
        );
    });
}
