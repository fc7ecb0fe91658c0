//! Idle VM classification
//!
//! Pure rule-based scoring: a record plus the current time and a set of
//! thresholds map to a status and a continuous idle score. The decision
//! order is load-bearing — missing-detection overrides every metric
//! signal, the powered-off zombie rule overrides resource scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inventory::InventoryStore;
use crate::models::{InventoryRecord, PowerState, SourceId, VmStatus};

/// Weight of the low-CPU signal
const CPU_WEIGHT: f64 = 0.4;
/// Weight of the low-network signal
const NETWORK_WEIGHT: f64 = 0.3;
/// Weight of the low-disk signal
const DISK_WEIGHT: f64 = 0.2;

/// Classification thresholds, passed explicitly into every invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Days without being seen in a scan before a VM counts as missing
    #[serde(default = "default_missing_days")]
    pub missing_days: i64,
    /// Powered-off VMs booted longer ago than this are zombies
    #[serde(default = "default_poweredoff_idle_days")]
    pub poweredoff_idle_days: i64,
    #[serde(default = "default_cpu_idle_percent")]
    pub cpu_idle_percent: f64,
    #[serde(default = "default_network_idle_kbps")]
    pub network_idle_kbps: f64,
    #[serde(default = "default_disk_idle_iops")]
    pub disk_idle_iops: f64,
}

fn default_missing_days() -> i64 {
    7
}

fn default_poweredoff_idle_days() -> i64 {
    30
}

fn default_cpu_idle_percent() -> f64 {
    5.0
}

fn default_network_idle_kbps() -> f64 {
    1.0
}

fn default_disk_idle_iops() -> f64 {
    5.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            missing_days: default_missing_days(),
            poweredoff_idle_days: default_poweredoff_idle_days(),
            cpu_idle_percent: default_cpu_idle_percent(),
            network_idle_kbps: default_network_idle_kbps(),
            disk_idle_iops: default_disk_idle_iops(),
        }
    }
}

/// Result of classifying one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub status: VmStatus,
    pub score: f64,
}

/// Classify a record; first matching rule wins
pub fn classify(record: &InventoryRecord, now: DateTime<Utc>, t: &Thresholds) -> Classification {
    // Missing: not seen in recent scans (deleted or not collected)
    let missing = match record.last_observed_at {
        None => true,
        Some(seen) => (now - seen).num_days() >= t.missing_days,
    };
    if missing {
        return Classification {
            status: VmStatus::Missing,
            score: 1.0,
        };
    }

    match record.power_state {
        PowerState::PoweredOff => {
            // Zombie: off for longer than the threshold; boundary is exclusive
            let zombie = record
                .last_boot_time
                .map(|boot| (now - boot).num_days() > t.poweredoff_idle_days)
                .unwrap_or(false);
            if zombie {
                Classification {
                    status: VmStatus::Idle,
                    score: 1.0,
                }
            } else {
                // Recently powered off: not enough evidence yet
                Classification {
                    status: VmStatus::Active,
                    score: 0.0,
                }
            }
        }
        PowerState::PoweredOn => {
            // Weighted sum of independent low-usage signals; an absent
            // metric contributes nothing, not a penalty
            let mut points = 0.0;
            if let Some(cpu) = record.cpu_usage_percent {
                if cpu < t.cpu_idle_percent {
                    points += CPU_WEIGHT;
                }
            }
            if let Some(network) = record.network_usage_kbps {
                if network < t.network_idle_kbps {
                    points += NETWORK_WEIGHT;
                }
            }
            if let Some(disk) = record.disk_usage_iops {
                if disk < t.disk_idle_iops {
                    points += DISK_WEIGHT;
                }
            }
            let score = points.min(1.0);
            Classification {
                status: if score >= 0.5 {
                    VmStatus::Idle
                } else {
                    VmStatus::Active
                },
                score,
            }
        }
        // No evidence of idleness either way
        PowerState::Unknown => Classification {
            status: VmStatus::Active,
            score: 0.0,
        },
    }
}

/// Write the classification back only when it changed; returns whether a
/// write occurred
pub fn apply(record: &mut InventoryRecord, now: DateTime<Utc>, t: &Thresholds) -> bool {
    let result = classify(record, now, t);
    if record.status != result.status || record.idle_score != Some(result.score) {
        record.status = result.status;
        record.idle_score = Some(result.score);
        true
    } else {
        false
    }
}

/// Reclassify all records, or one source's; returns how many changed
pub fn run_detection(
    store: &InventoryStore,
    source_id: Option<SourceId>,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> usize {
    store.reclassify(source_id, |record| apply(record, now, thresholds))
}
