//! Core data models for idle VM detection

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sources::ConnectionConfig;

/// Identifier of a configured data source
pub type SourceId = u64;

/// Identifier of a scan run
pub type RunId = u64;

/// Power state reported by the upstream source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    #[serde(rename = "poweredOn")]
    PoweredOn,
    #[serde(rename = "poweredOff")]
    PoweredOff,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl PowerState {
    /// Parse a vendor power-state string (`poweredOn`, `POWERED_OFF`, `off`, ...)
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "poweredon" | "on" | "running" => PowerState::PoweredOn,
            "poweredoff" | "off" | "stopped" => PowerState::PoweredOff,
            _ => PowerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::PoweredOn => "poweredOn",
            PowerState::PoweredOff => "poweredOff",
            PowerState::Unknown => "unknown",
        }
    }
}

/// Kind of external data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Hypervisor management API (VM list with quick stats and boot time)
    Hypervisor,
    /// Operations-monitoring REST API (named metric keys with aliases)
    OpsMonitor,
    /// Storage I/O monitoring API (read/write throughput only)
    StorageMonitor,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Hypervisor => "hypervisor",
            SourceKind::OpsMonitor => "ops-monitor",
            SourceKind::StorageMonitor => "storage-monitor",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VM snapshot normalized from any source
///
/// Absent metrics stay `None`; a `Some(0.0)` means the source measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSnapshot {
    /// Opaque identity, unique within a source (e.g. instance UUID)
    pub identity: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub power_state: PowerState,
    pub cpu_usage_mhz: Option<f64>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_mb: Option<f64>,
    pub memory_usage_percent: Option<f64>,
    pub network_usage_kbps: Option<f64>,
    pub disk_usage_iops: Option<f64>,
    pub disk_read_kbps: Option<f64>,
    pub disk_write_kbps: Option<f64>,
    /// When the VM was last booted, if the source reports it
    pub last_boot_time: Option<DateTime<Utc>>,
    pub uptime_days: Option<f64>,
    /// Source-specific attributes (vCPU count, memory size, cluster, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl VmSnapshot {
    /// Create a snapshot with only identity and name set
    pub fn new(identity: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            name: name.into(),
            power_state: PowerState::Unknown,
            cpu_usage_mhz: None,
            cpu_usage_percent: None,
            memory_usage_mb: None,
            memory_usage_percent: None,
            network_usage_kbps: None,
            disk_usage_iops: None,
            disk_read_kbps: None,
            disk_write_kbps: None,
            last_boot_time: None,
            uptime_days: None,
            attributes: BTreeMap::new(),
        }
    }
}

/// Classification result bucket for an inventory record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    /// In use, or not enough evidence to call it idle
    #[default]
    Active,
    /// Low or no resource usage
    Idle,
    /// Not seen in recent scans; presumed deleted or unreachable
    Missing,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Active => "active",
            VmStatus::Idle => "idle",
            VmStatus::Missing => "missing",
        }
    }
}

/// Durable inventory record for one VM observed from one source
///
/// Keyed by (source id, identity). Updated in place on every observation;
/// never deleted automatically — staleness of `last_observed_at` is how
/// "missing" is detected. `status` and `idle_score` are written only by
/// the classification engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub source_id: SourceId,
    pub source_name: String,
    pub identity: String,
    pub name: String,
    pub power_state: PowerState,
    pub cpu_usage_mhz: Option<f64>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_mb: Option<f64>,
    pub memory_usage_percent: Option<f64>,
    pub network_usage_kbps: Option<f64>,
    pub disk_usage_iops: Option<f64>,
    pub disk_read_kbps: Option<f64>,
    pub disk_write_kbps: Option<f64>,
    pub last_boot_time: Option<DateTime<Utc>>,
    pub uptime_days: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Last time a successful fetch included this VM
    pub last_observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: VmStatus,
    /// 0.0 = certainly active, 1.0 = certainly idle/missing; None = not yet scored
    pub idle_score: Option<f64>,
}

/// A configured external data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

fn default_enabled() -> bool {
    true
}

/// Source definition before registration (id assigned by the registry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// State of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

/// Audit record for one orchestration attempt against one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub source_id: SourceId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Summary on success ("12 VMs"), stringified cause on failure
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_parse_vendor_strings() {
        assert_eq!(PowerState::parse("poweredOn"), PowerState::PoweredOn);
        assert_eq!(PowerState::parse("POWERED_OFF"), PowerState::PoweredOff);
        assert_eq!(PowerState::parse("running"), PowerState::PoweredOn);
        assert_eq!(PowerState::parse("stopped"), PowerState::PoweredOff);
        assert_eq!(PowerState::parse("suspended"), PowerState::Unknown);
        assert_eq!(PowerState::parse(""), PowerState::Unknown);
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let mut snapshot = VmSnapshot::new("vm-42", "build-agent");
        snapshot.power_state = PowerState::PoweredOn;
        snapshot.cpu_usage_percent = Some(0.0);
        snapshot.last_boot_time = Some(Utc::now());
        snapshot
            .attributes
            .insert("num_cpus".into(), serde_json::json!(4));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: VmSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(back, snapshot);
        // Measured zero must survive the round trip as zero, not absent
        assert_eq!(back.cpu_usage_percent, Some(0.0));
        assert_eq!(back.network_usage_kbps, None);
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
