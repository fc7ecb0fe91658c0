//! Scan orchestration
//!
//! For each enabled source: fetch (or cache hit) → upsert inventory →
//! finish the run record → reclassify that source's VMs. Failures are
//! isolated at the per-source boundary so one misbehaving source cannot
//! abort a multi-source scan, and classification is skipped for a source
//! whose fetch failed — stale data is held at its last-known status
//! rather than rescored against an outage.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{cache_key, ResponseCache, DEFAULT_TTL};
use crate::detection::{run_detection, Thresholds};
use crate::inventory::{InventoryError, InventoryStore};
use crate::models::{RunId, RunStatus, Source, SourceId, VmStatus};
use crate::observability::HunterMetrics;
use crate::registry::SourceRegistry;
use crate::runs::RunLedger;
use crate::sources::{adapter_for, FetchFailure, FetchOutcome};

/// Cache purpose tag for inventory fetches
const INVENTORY_PURPOSE: &str = "inventory";

/// Error inside one source's scan; never crosses the per-source boundary
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{0}")]
    Fetch(#[from] FetchFailure),
    #[error("inventory error: {0}")]
    Store(#[from] InventoryError),
}

/// Outcome of one source's scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanOutcome {
    Success { synced: usize, reclassified: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceScanResult {
    pub source_id: SourceId,
    pub run_id: RunId,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

/// Aggregate result of one scan invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub results: Vec<SourceScanResult>,
}

impl ScanReport {
    fn not_found(source_id: SourceId) -> Self {
        Self {
            ok: false,
            error: Some(format!("source {source_id} not found or disabled")),
            results: Vec::new(),
        }
    }

    /// Number of per-source failures in this report
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| matches!(result.outcome, ScanOutcome::Failed { .. }))
            .count()
    }
}

/// Orchestrates scans across the configured sources
pub struct ScanOrchestrator {
    sources: Arc<SourceRegistry>,
    inventory: Arc<InventoryStore>,
    runs: Arc<RunLedger>,
    cache: Arc<ResponseCache>,
    thresholds: Thresholds,
    cache_ttl: Duration,
    metrics: HunterMetrics,
}

impl ScanOrchestrator {
    pub fn new(
        sources: Arc<SourceRegistry>,
        inventory: Arc<InventoryStore>,
        runs: Arc<RunLedger>,
        cache: Arc<ResponseCache>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            sources,
            inventory,
            runs,
            cache,
            thresholds,
            cache_ttl: DEFAULT_TTL,
            metrics: HunterMetrics::new(),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn sources(&self) -> &Arc<SourceRegistry> {
        &self.sources
    }

    pub fn inventory(&self) -> &Arc<InventoryStore> {
        &self.inventory
    }

    pub fn runs(&self) -> &Arc<RunLedger> {
        &self.runs
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Scan one designated source, or all enabled sources
    ///
    /// Each source gets its own run record and outcome; a designated
    /// source that is unknown or disabled yields `{ok: false, error}`
    /// without touching anything else.
    pub async fn run_scan(&self, source_id: Option<SourceId>) -> ScanReport {
        let targets = match source_id {
            Some(id) => match self.sources.get(id).filter(|source| source.enabled) {
                Some(source) => vec![source],
                None => {
                    warn!(source_id = id, "Scan requested for unknown or disabled source");
                    return ScanReport::not_found(id);
                }
            },
            None => self.sources.enabled(),
        };

        let started = std::time::Instant::now();
        let mut results = Vec::with_capacity(targets.len());
        for source in &targets {
            results.push(self.scan_source(source).await);
        }
        self.metrics
            .observe_scan_duration(started.elapsed().as_secs_f64());
        self.publish_inventory_counts();

        ScanReport {
            ok: true,
            error: None,
            results,
        }
    }

    /// Run the full detection sweep without fetching (operator surface)
    pub fn detect_all(&self) -> usize {
        let updated = run_detection(&self.inventory, None, Utc::now(), &self.thresholds);
        self.metrics.add_reclassified(updated);
        self.publish_inventory_counts();
        updated
    }

    /// Delete a source and cascade to its inventory and run records
    pub fn remove_source(&self, source_id: SourceId) -> Option<Source> {
        let source = self.sources.remove(source_id)?;
        let records = self.inventory.remove_source(source_id);
        let runs = self.runs.remove_source(source_id);
        info!(source_id, records, runs, "Removed source and dependents");
        self.publish_inventory_counts();
        Some(source)
    }

    async fn scan_source(&self, source: &Source) -> SourceScanResult {
        let run = self.runs.start(source.id, Utc::now());
        info!(
            source_id = source.id,
            source = %source.name,
            kind = %source.kind,
            run_id = run.id,
            "Scanning source"
        );

        match self.sync_source(source).await {
            Ok(synced) => {
                self.runs.finish(
                    run.id,
                    RunStatus::Success,
                    Utc::now(),
                    format!("{synced} VMs"),
                );
                self.metrics.record_run_outcome(true);

                // Detection runs even on an empty fetch so stale records
                // age into missing every cycle
                let reclassified =
                    run_detection(&self.inventory, Some(source.id), Utc::now(), &self.thresholds);
                self.metrics.add_reclassified(reclassified);
                debug!(
                    source_id = source.id,
                    synced, reclassified, "Source scan complete"
                );

                SourceScanResult {
                    source_id: source.id,
                    run_id: run.id,
                    outcome: ScanOutcome::Success {
                        synced,
                        reclassified,
                    },
                }
            }
            Err(error) => {
                let message = error.to_string();
                warn!(source_id = source.id, error = %message, "Source scan failed");
                self.runs
                    .finish(run.id, RunStatus::Failed, Utc::now(), message.clone());
                self.metrics.record_run_outcome(false);

                SourceScanResult {
                    source_id: source.id,
                    run_id: run.id,
                    outcome: ScanOutcome::Failed { error: message },
                }
            }
        }
    }

    /// Fetch (or reuse cached) snapshots and upsert them
    async fn sync_source(&self, source: &Source) -> Result<usize, ScanError> {
        let key = cache_key(source.kind, source.id, INVENTORY_PURPOSE);
        let snapshots = match self.cache.get(&key) {
            Some(cached) => {
                debug!(source_id = source.id, count = cached.len(), "Cache hit");
                cached
            }
            None => {
                let adapter = adapter_for(source.kind);
                match adapter.fetch_inventory(&source.connection).await {
                    FetchOutcome::Fetched(snapshots) => {
                        self.cache.set(&key, &snapshots, self.cache_ttl);
                        snapshots
                    }
                    FetchOutcome::Unavailable(failure) => return Err(ScanError::Fetch(failure)),
                }
            }
        };

        let observed_at = Utc::now();
        let mut synced = 0;
        for snapshot in snapshots {
            if snapshot.identity.trim().is_empty() {
                debug!(source_id = source.id, "Skipping snapshot without identity");
                continue;
            }
            self.inventory.upsert(source, snapshot, observed_at)?;
            synced += 1;
        }
        Ok(synced)
    }

    fn publish_inventory_counts(&self) {
        let records = self.inventory.all();
        let idle = records
            .iter()
            .filter(|record| record.status == VmStatus::Idle)
            .count();
        let missing = records
            .iter()
            .filter(|record| record.status == VmStatus::Missing)
            .count();
        self.metrics
            .set_inventory_counts(records.len(), idle, missing);
    }
}
