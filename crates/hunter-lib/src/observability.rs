//! Observability infrastructure for the scanner
//!
//! Provides:
//! - Prometheus metrics (scan latency, inventory counts, run outcomes)
//! - Structured lifecycle logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::info;

/// Histogram buckets for scan duration (in seconds)
const SCAN_DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HunterMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct HunterMetricsInner {
    scan_duration_seconds: Histogram,
    vms_monitored: IntGauge,
    idle_vms: IntGauge,
    missing_vms: IntGauge,
    scan_runs: IntCounterVec,
    vms_reclassified: IntCounter,
}

impl HunterMetricsInner {
    fn new() -> Self {
        Self {
            scan_duration_seconds: register_histogram!(
                "idlehunter_scan_duration_seconds",
                "Time spent scanning all selected sources",
                SCAN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register scan_duration_seconds"),

            vms_monitored: register_int_gauge!(
                "idlehunter_vms_monitored",
                "Number of VMs currently in the inventory"
            )
            .expect("Failed to register vms_monitored"),

            idle_vms: register_int_gauge!(
                "idlehunter_idle_vms",
                "Number of VMs currently classified as idle"
            )
            .expect("Failed to register idle_vms"),

            missing_vms: register_int_gauge!(
                "idlehunter_missing_vms",
                "Number of VMs currently classified as missing"
            )
            .expect("Failed to register missing_vms"),

            scan_runs: register_int_counter_vec!(
                "idlehunter_scan_runs_total",
                "Scan runs by terminal outcome",
                &["outcome"]
            )
            .expect("Failed to register scan_runs_total"),

            vms_reclassified: register_int_counter!(
                "idlehunter_vms_reclassified_total",
                "Total number of records whose classification changed"
            )
            .expect("Failed to register vms_reclassified_total"),
        }
    }
}

/// Scanner metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct HunterMetrics {
    _private: (),
}

impl Default for HunterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HunterMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HunterMetricsInner::new);
        Self { _private: () }
    }

    fn inner() -> &'static HunterMetricsInner {
        GLOBAL_METRICS.get_or_init(HunterMetricsInner::new)
    }

    pub fn observe_scan_duration(&self, seconds: f64) {
        Self::inner().scan_duration_seconds.observe(seconds);
    }

    pub fn record_run_outcome(&self, success: bool) {
        let outcome = if success { "success" } else { "failed" };
        Self::inner().scan_runs.with_label_values(&[outcome]).inc();
    }

    pub fn set_inventory_counts(&self, total: usize, idle: usize, missing: usize) {
        let inner = Self::inner();
        inner.vms_monitored.set(total as i64);
        inner.idle_vms.set(idle as i64);
        inner.missing_vms.set(missing as i64);
    }

    pub fn add_reclassified(&self, count: usize) {
        Self::inner().vms_reclassified.inc_by(count as u64);
    }
}

/// Structured logger for lifecycle events
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            instance = %self.instance,
            version = %version,
            event = "startup",
            "IdleHunter scanner starting"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            instance = %self.instance,
            reason = %reason,
            event = "shutdown",
            "IdleHunter scanner shutting down"
        );
    }

    pub fn log_scan_summary(&self, sources: usize, failed: usize, duration_secs: f64) {
        info!(
            instance = %self.instance,
            sources,
            failed,
            duration_secs,
            event = "scan_complete",
            "Scan sweep complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handle_is_cloneable_and_shared() {
        let metrics = HunterMetrics::new();
        let clone = metrics.clone();

        metrics.observe_scan_duration(0.25);
        clone.record_run_outcome(true);
        clone.record_run_outcome(false);
        metrics.set_inventory_counts(10, 3, 1);
        metrics.add_reclassified(4);
    }
}
