use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact console logging filtered by `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rss_aggregator=info,ingest=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
