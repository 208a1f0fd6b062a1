//! Health data export server.

use std::sync::Arc;

use health_data_export::config::ServiceConfig;
use health_data_export::jobs::{ExportService, JobSettings};
use health_data_export::records::SyntheticRecords;
use health_data_export::server::router;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "health_data_export=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;
    let catalog = config.load_catalog()?;
    info!(
        "Loaded {} datasets: {:?}",
        catalog.list_datasets().len(),
        catalog.list_datasets().iter().map(|d| d.id.as_str()).collect::<Vec<_>>()
    );

    let source = Arc::new(SyntheticRecords::new(config.seed));
    let service = ExportService::new(
        catalog,
        source,
        JobSettings::from(&config),
        config.history_limit,
    );
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
