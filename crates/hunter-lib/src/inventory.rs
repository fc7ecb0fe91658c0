//! Durable inventory of observed VMs
//!
//! Records are keyed by (source id, identity) and updated in place on
//! every observation. Metric fields are last-write-wins while
//! `last_observed_at` only ever advances; records are never deleted
//! automatically — staleness is how "missing" is detected. Optional JSON
//! file persistence reloads the inventory across restarts.

use std::cmp::Ordering as CmpOrdering;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{InventoryRecord, PowerState, Source, SourceId, VmSnapshot, VmStatus};

/// Score at or above which a record lands in the zombie bucket
pub const ZOMBIE_SCORE: f64 = 0.8;

/// Score at or above which a record counts as idle in query buckets
pub const IDLE_SCORE: f64 = 0.5;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("snapshot identity must be non-empty")]
    EmptyIdentity,
}

/// Status bucket used by the dashboard query surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    #[default]
    All,
    /// idle score >= 0.8
    Zombie,
    /// idle score >= 0.5
    Idle,
    /// idle score < 0.5, or not yet scored
    Active,
    /// power state contains "off"
    PoweredOff,
    /// not seen within the staleness window
    Missing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    IdleScore,
    Name,
    Source,
    PowerState,
    LastSeen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySort {
    pub field: SortField,
    pub dir: SortDir,
}

impl Default for InventorySort {
    fn default() -> Self {
        // Dashboards want the most idle VMs first
        Self {
            field: SortField::IdleScore,
            dir: SortDir::Desc,
        }
    }
}

/// Filter for the query surface; all conditions are conjunctive
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    /// Case-insensitive substring match on VM or source name
    pub query: Option<String>,
    pub status: StatusBucket,
    /// Case-insensitive substring match on power state
    pub power_state: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: usize,
    pub page_size: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    fn normalized(self) -> (usize, usize) {
        (self.page.max(1), self.page_size.clamp(1, MAX_PAGE_SIZE))
    }
}

/// One page of query results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    pub records: Vec<InventoryRecord>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

/// Keyed store of inventory records with optional file persistence
pub struct InventoryStore {
    records: DashMap<(SourceId, String), InventoryRecord>,
    persistence_path: Option<PathBuf>,
    dirty: AtomicBool,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            persistence_path: None,
            dirty: AtomicBool::new(false),
        }
    }

    /// Create a store persisted at `path`, loading any existing file
    pub fn with_persistence(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = Self {
            records: DashMap::new(),
            persistence_path: Some(path.clone()),
            dirty: AtomicBool::new(false),
        };
        if path.exists() {
            if let Err(e) = store.load_from_disk(&path) {
                warn!(error = %e, "Failed to load persisted inventory, starting fresh");
            }
        }
        Ok(store)
    }

    /// Create or update the record for (source, identity)
    ///
    /// Metric fields are overwritten; `last_observed_at` advances to the
    /// max of the stored and incoming values; `status`/`idle_score` are
    /// left for the classification engine.
    pub fn upsert(
        &self,
        source: &Source,
        snapshot: VmSnapshot,
        observed_at: DateTime<Utc>,
    ) -> Result<InventoryRecord, InventoryError> {
        if snapshot.identity.trim().is_empty() {
            return Err(InventoryError::EmptyIdentity);
        }

        let key = (source.id, snapshot.identity.clone());
        let mut entry = self.records.entry(key).or_insert_with(|| InventoryRecord {
            source_id: source.id,
            source_name: source.name.clone(),
            identity: snapshot.identity.clone(),
            name: String::new(),
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
            attributes: Default::default(),
            last_observed_at: None,
            status: VmStatus::Active,
            idle_score: None,
        });

        let record = entry.value_mut();
        record.source_name = source.name.clone();
        record.name = if snapshot.name.trim().is_empty() {
            snapshot.identity.chars().take(8).collect()
        } else {
            snapshot.name.clone()
        };
        record.power_state = snapshot.power_state;
        record.cpu_usage_mhz = snapshot.cpu_usage_mhz;
        record.cpu_usage_percent = snapshot.cpu_usage_percent;
        record.memory_usage_mb = snapshot.memory_usage_mb;
        record.memory_usage_percent = snapshot.memory_usage_percent;
        record.network_usage_kbps = snapshot.network_usage_kbps;
        record.disk_usage_iops = snapshot.disk_usage_iops;
        record.disk_read_kbps = snapshot.disk_read_kbps;
        record.disk_write_kbps = snapshot.disk_write_kbps;
        record.last_boot_time = snapshot.last_boot_time;
        record.uptime_days = snapshot.uptime_days;
        record.attributes = snapshot.attributes;
        record.last_observed_at = Some(match record.last_observed_at {
            Some(previous) if previous > observed_at => previous,
            _ => observed_at,
        });

        let updated = record.clone();
        drop(entry);
        self.dirty.store(true, Ordering::Relaxed);
        Ok(updated)
    }

    pub fn get(&self, source_id: SourceId, identity: &str) -> Option<InventoryRecord> {
        self.records
            .get(&(source_id, identity.to_string()))
            .map(|entry| entry.clone())
    }

    pub fn all(&self) -> Vec<InventoryRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn records_for_source(&self, source_id: SourceId) -> Vec<InventoryRecord> {
        self.records
            .iter()
            .filter(|entry| entry.key().0 == source_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Cascade hook for source deletion; returns removed record count
    pub fn remove_source(&self, source_id: SourceId) -> usize {
        let before = self.records.len();
        self.records.retain(|key, _| key.0 != source_id);
        let removed = before - self.records.len();
        if removed > 0 {
            self.dirty.store(true, Ordering::Relaxed);
            debug!(source_id, removed, "Removed inventory records for source");
        }
        removed
    }

    /// Apply `classify` to every record (or one source's records);
    /// returns how many records it changed
    pub fn reclassify<F>(&self, source_id: Option<SourceId>, mut classify: F) -> usize
    where
        F: FnMut(&mut InventoryRecord) -> bool,
    {
        let mut updated = 0;
        for mut entry in self.records.iter_mut() {
            if let Some(id) = source_id {
                if entry.key().0 != id {
                    continue;
                }
            }
            if classify(entry.value_mut()) {
                updated += 1;
            }
        }
        if updated > 0 {
            self.dirty.store(true, Ordering::Relaxed);
        }
        updated
    }

    /// Filtered, sorted, paginated view for dashboards
    pub fn query(&self, filter: &InventoryFilter, sort: InventorySort, page: Page) -> QueryPage {
        let needle = filter.query.as_deref().map(str::to_lowercase);
        let power_needle = filter.power_state.as_deref().map(str::to_lowercase);

        let mut matches: Vec<InventoryRecord> = self
            .records
            .iter()
            .filter(|entry| {
                let record = entry.value();
                if let Some(q) = &needle {
                    let hit = record.name.to_lowercase().contains(q)
                        || record.source_name.to_lowercase().contains(q);
                    if !hit {
                        return false;
                    }
                }
                if let Some(p) = &power_needle {
                    if !record.power_state.as_str().to_lowercase().contains(p) {
                        return false;
                    }
                }
                matches_bucket(record, filter.status)
            })
            .map(|entry| entry.value().clone())
            .collect();

        sort_records(&mut matches, sort);

        let (page_number, page_size) = page.normalized();
        let total = matches.len();
        let pages = total.div_ceil(page_size).max(1);
        let records = matches
            .into_iter()
            .skip((page_number - 1) * page_size)
            .take(page_size)
            .collect();

        QueryPage {
            records,
            total,
            page: page_number,
            pages,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flush to disk if persistence is enabled and there are changes
    pub fn flush(&self) -> Result<()> {
        if !self.dirty.load(Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(path) = &self.persistence_path {
            self.save_to_disk(path)?;
            self.dirty.store(false, Ordering::Relaxed);
            debug!(path = %path.display(), records = self.records.len(), "Inventory flushed to disk");
        }
        Ok(())
    }

    fn save_to_disk(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let records = self.all();
        let json = serde_json::to_vec(&records).context("Failed to serialize inventory")?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&json).context("Failed to write inventory")?;
        file.sync_all().context("Failed to sync inventory file")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
        Ok(())
    }

    fn load_from_disk(&self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read inventory file {:?}", path))?;
        let records: Vec<InventoryRecord> =
            serde_json::from_slice(&data).context("Failed to deserialize inventory")?;

        for record in records {
            self.records
                .insert((record.source_id, record.identity.clone()), record);
        }
        info!(path = %path.display(), records = self.records.len(), "Loaded inventory from disk");
        Ok(())
    }
}

impl Default for InventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_bucket(record: &InventoryRecord, bucket: StatusBucket) -> bool {
    match bucket {
        StatusBucket::All => true,
        StatusBucket::Zombie => record.idle_score.is_some_and(|s| s >= ZOMBIE_SCORE),
        StatusBucket::Idle => record.idle_score.is_some_and(|s| s >= IDLE_SCORE),
        StatusBucket::Active => record.idle_score.map_or(true, |s| s < IDLE_SCORE),
        StatusBucket::PoweredOff => record.power_state.as_str().to_lowercase().contains("off"),
        StatusBucket::Missing => record.status == VmStatus::Missing,
    }
}

fn sort_records(records: &mut [InventoryRecord], sort: InventorySort) {
    records.sort_by(|a, b| {
        let ordering = match sort.field {
            SortField::IdleScore => cmp_optional_f64(a.idle_score, b.idle_score),
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Source => a.source_name.to_lowercase().cmp(&b.source_name.to_lowercase()),
            SortField::PowerState => a.power_state.as_str().cmp(b.power_state.as_str()),
            SortField::LastSeen => a.last_observed_at.cmp(&b.last_observed_at),
        };
        let ordering = ordering.then_with(|| a.name.cmp(&b.name));
        match sort.dir {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    });
}

/// None sorts below any score
fn cmp_optional_f64(a: Option<f64>, b: Option<f64>) -> CmpOrdering {
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(CmpOrdering::Equal),
    }
}
