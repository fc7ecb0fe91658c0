//! HTTP API for health checks, metrics, scan triggering and inventory queries

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use hunter_lib::health::{ComponentStatus, HealthRegistry};
use hunter_lib::inventory::{
    InventoryFilter, InventorySort, Page, SortDir, SortField, StatusBucket,
};
use hunter_lib::models::{RunRecord, RunStatus, SourceId, SourceKind};
use hunter_lib::savings::estimate_savings;
use hunter_lib::scan::ScanOrchestrator;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub health: HealthRegistry,
}

impl AppState {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, health: HealthRegistry) -> Self {
        Self {
            orchestrator,
            health,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

#[derive(Debug, Default, Deserialize)]
struct ScanRequest {
    source_id: Option<SourceId>,
}

/// Trigger a scan of one source or all enabled sources
async fn trigger_scan(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ScanRequest>>,
) -> impl IntoResponse {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let report = state.orchestrator.run_scan(request.source_id).await;

    if request.source_id.is_none() {
        state
            .health
            .note_scan_outcome(report.results.len(), report.failed_count())
            .await;
    }
    if let Err(e) = state.orchestrator.inventory().flush() {
        tracing::warn!(error = %e, "Failed to flush inventory after scan");
    }

    let status_code = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status_code, Json(report))
}

#[derive(Debug, Serialize, Deserialize)]
struct DetectResponse {
    updated: usize,
}

/// Re-run classification over the whole inventory without fetching
async fn trigger_detect(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let updated = state.orchestrator.detect_all();
    Json(DetectResponse { updated })
}

#[derive(Debug, Default, Deserialize)]
struct VmQuery {
    /// Substring match on VM or source name
    q: Option<String>,
    status: Option<StatusBucket>,
    power: Option<String>,
    sort: Option<SortField>,
    dir: Option<SortDir>,
    page: Option<usize>,
    page_size: Option<usize>,
}

/// List inventory records with filtering, sorting and pagination
async fn list_vms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VmQuery>,
) -> impl IntoResponse {
    let filter = InventoryFilter {
        query: query.q,
        status: query.status.unwrap_or_default(),
        power_state: query.power,
    };
    let default_sort = InventorySort::default();
    let sort = InventorySort {
        field: query.sort.unwrap_or(default_sort.field),
        dir: query.dir.unwrap_or(default_sort.dir),
    };
    let default_page = Page::default();
    let page = Page {
        page: query.page.unwrap_or(default_page.page),
        page_size: query.page_size.unwrap_or(default_page.page_size),
    };

    Json(state.orchestrator.inventory().query(&filter, sort, page))
}

#[derive(Debug, Default, Deserialize)]
struct RunsQuery {
    source_id: Option<SourceId>,
}

/// List scan runs, most recent first
async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunsQuery>,
) -> Json<Vec<RunRecord>> {
    let runs = match query.source_id {
        Some(id) => state.orchestrator.runs().for_source(id),
        None => state.orchestrator.runs().list(),
    };
    Json(runs)
}

/// Source listing entry; connection settings are never exposed
#[derive(Debug, Serialize, Deserialize)]
struct SourceSummary {
    id: SourceId,
    name: String,
    kind: SourceKind,
    enabled: bool,
    vm_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run_status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run_at: Option<DateTime<Utc>>,
}

/// List configured sources with inventory and run summaries
async fn list_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceSummary>> {
    let summaries = state
        .orchestrator
        .sources()
        .list()
        .into_iter()
        .map(|source| {
            let last_run = state.orchestrator.runs().for_source(source.id).into_iter().next();
            SourceSummary {
                id: source.id,
                name: source.name,
                kind: source.kind,
                enabled: source.enabled,
                vm_count: state.orchestrator.inventory().records_for_source(source.id).len(),
                last_run_status: last_run.as_ref().map(|run| run.status),
                last_run_at: last_run.map(|run| run.started_at),
            }
        })
        .collect();
    Json(summaries)
}

/// Delete a source, cascading to its inventory and run records
async fn remove_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SourceId>,
) -> StatusCode {
    match state.orchestrator.remove_source(id) {
        Some(source) => {
            info!(source_id = id, source = %source.name, "Source deleted via API");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Reclaimable-capacity estimate over the current inventory
async fn savings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let records = state.orchestrator.inventory().all();
    Json(estimate_savings(&records))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/scan", post(trigger_scan))
        .route("/detect", post(trigger_detect))
        .route("/vms", get(list_vms))
        .route("/runs", get(list_runs))
        .route("/sources", get(list_sources))
        .route("/sources/:id", delete(remove_source))
        .route("/savings", get(savings))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
