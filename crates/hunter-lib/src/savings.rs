//! Reclaimable-capacity estimation
//!
//! Sums the vCPU and memory attributes of records scoring at or above
//! the reclaim threshold, for the dashboard savings KPI.

use serde::{Deserialize, Serialize};

use crate::models::InventoryRecord;

/// Idle score at or above which a VM counts toward reclaimable capacity
pub const SAVINGS_SCORE_THRESHOLD: f64 = 0.7;

/// Aggregate capacity held by idle VMs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsSummary {
    pub idle_vms: usize,
    pub reclaimable_vcpus: u64,
    pub reclaimable_ram_gb: f64,
}

/// Estimate reclaimable capacity from the current inventory
pub fn estimate_savings(records: &[InventoryRecord]) -> SavingsSummary {
    let mut summary = SavingsSummary::default();
    let mut ram_mb = 0.0;

    for record in records {
        let reclaimable = record
            .idle_score
            .is_some_and(|score| score >= SAVINGS_SCORE_THRESHOLD);
        if !reclaimable {
            continue;
        }
        summary.idle_vms += 1;
        summary.reclaimable_vcpus += record
            .attributes
            .get("num_cpus")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        ram_mb += record
            .attributes
            .get("memory_size_mb")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
    }

    summary.reclaimable_ram_gb = (ram_mb / 1024.0 * 10.0).round() / 10.0;
    summary
}
