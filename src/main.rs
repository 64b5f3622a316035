//! RSS Aggregator — Binary Entrypoint
//! Boots the Axum HTTP server, the background ingestion scheduler and the
//! snapshot writer.

use std::net::SocketAddr;

use rss_aggregator::{metrics::Metrics, telemetry, Aggregator, AggregatorConfig};

struct AggregatorService {
    app: Aggregator,
    metrics: Metrics,
}

#[shuttle_runtime::main]
async fn main() -> Result<AggregatorService, shuttle_runtime::Error> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let config = AggregatorConfig::load_default()?;
    tracing::info!(?config, "configuration loaded");

    let app = Aggregator::from_config(config).await?;
    let metrics = Metrics::install()?;
    Ok(AggregatorService { app, metrics })
}

#[shuttle_runtime::async_trait]
impl shuttle_runtime::Service for AggregatorService {
    // The runtime handles SIGINT/SIGTERM itself and exits the process, so
    // nothing after `serve` is guaranteed to run; the snapshot writer flushes
    // each store write as it happens.
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        let snapshots = self.app.spawn_snapshot_writer();
        let scheduler = self.app.spawn_scheduler()?;
        let router = self.app.router().merge(self.metrics.router());

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(anyhow::Error::from)?;
        tracing::info!(%addr, "listening");

        let served = axum::serve(listener, router).await;

        // only reached when the server itself fails
        scheduler.shutdown().await;
        if let Some(snapshots) = snapshots {
            snapshots.shutdown().await;
        }

        served.map_err(anyhow::Error::from)?;
        Ok(())
    }
}
