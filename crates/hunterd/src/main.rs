//! IdleHunter daemon
//!
//! Discovers VMs from the configured sources on a schedule, scores them
//! for idleness, and serves the health/metrics/query API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hunter_lib::cache::ResponseCache;
use hunter_lib::health::{components, HealthRegistry};
use hunter_lib::inventory::InventoryStore;
use hunter_lib::observability::{HunterMetrics, StructuredLogger};
use hunter_lib::registry::SourceRegistry;
use hunter_lib::runs::RunLedger;
use hunter_lib::scan::ScanOrchestrator;
use hunter_lib::schedule::{ScanLoop, ScanLoopConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const HUNTERD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hunterd");

    // Load configuration
    let config = config::HunterConfig::load()?;
    info!(
        api_port = config.api_port,
        scan_interval_secs = config.scan_interval_secs,
        "Daemon configured"
    );

    // Initialize structured logger and metrics
    let logger = StructuredLogger::new("hunterd");
    logger.log_startup(HUNTERD_VERSION);
    let _metrics = HunterMetrics::new();

    // Bootstrap sources from the configured file
    let sources = Arc::new(SourceRegistry::new());
    for spec in config::load_sources(&config.sources_file)? {
        let source = sources.add(spec);
        info!(source_id = source.id, source = %source.name, kind = %source.kind, "Source configured");
    }

    // Inventory store, persisted when a file is configured
    let inventory = match &config.inventory_file {
        Some(path) => Arc::new(InventoryStore::with_persistence(path)?),
        None => Arc::new(InventoryStore::new()),
    };

    let orchestrator = Arc::new(
        ScanOrchestrator::new(
            sources,
            inventory,
            Arc::new(RunLedger::new()),
            Arc::new(ResponseCache::new()),
            config.thresholds.clone(),
        )
        .with_cache_ttl(Duration::from_secs(config.cache_ttl_secs)),
    );

    // Initialize health registry
    let health = HealthRegistry::new();
    health.register(components::SOURCES).await;
    health.register(components::INVENTORY).await;
    health.register(components::SCANNER).await;
    health.register(components::CACHE).await;

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(orchestrator.clone(), health.clone()));

    // Mark daemon as ready after initialization
    health.set_ready(true).await;

    // Start health/metrics/query server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Start the recurring scan loop
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let scan_loop = ScanLoop::new(
        orchestrator.clone(),
        ScanLoopConfig {
            interval: Duration::from_secs(config.scan_interval_secs),
            jitter: Duration::from_secs(config.scan_jitter_secs),
        },
    )
    .with_health(health.clone());
    let loop_handle = tokio::spawn(scan_loop.run(shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    let _ = loop_handle.await;
    if let Err(e) = orchestrator.inventory().flush() {
        tracing::warn!(error = %e, "Failed to flush inventory on shutdown");
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
