//! Short-TTL memoization of adapter fetch results
//!
//! Avoids re-querying the same upstream within one scan window. Strictly
//! an optimization: a miss, an expired entry, or an unreadable payload
//! all fall through to the adapter fetch. Classification never reads
//! from here — it only sees the inventory store.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

use crate::models::{SourceId, SourceKind, VmSnapshot};

/// Default TTL for cached upstream responses
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Deterministic cache key from source kind, source identity and purpose
pub fn cache_key(kind: SourceKind, source_id: SourceId, purpose: &str) -> String {
    format!("idlehunter:{}:src{}:{}", kind.as_str(), source_id, purpose)
}

struct CacheEntry {
    /// JSON payload; RFC 3339 timestamps and numeric fields round-trip losslessly
    payload: String,
    expires_at: Instant,
}

/// Best-effort response cache; no locking beyond the map's own sharding
#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached snapshot list, dropping expired or unreadable entries
    pub fn get(&self, key: &str) -> Option<Vec<VmSnapshot>> {
        let payload = {
            let entry = self.entries.get(key)?;
            if entry.expires_at <= Instant::now() {
                None
            } else {
                Some(entry.payload.clone())
            }
        };

        match payload {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(snapshots) => Some(snapshots),
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping unreadable cache entry");
                    self.entries.remove(key);
                    None
                }
            },
            None => {
                self.entries.remove(key);
                None
            }
        }
    }

    pub fn set(&self, key: impl Into<String>, snapshots: &[VmSnapshot], ttl: Duration) {
        match serde_json::to_string(snapshots) {
            Ok(payload) => {
                self.entries.insert(
                    key.into(),
                    CacheEntry {
                        payload,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            Err(e) => warn!(error = %e, "Failed to serialize snapshots for cache"),
        }
    }

    /// Drop all expired entries
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PowerState;
    use chrono::{TimeZone, Utc};

    fn snapshot() -> VmSnapshot {
        let mut snapshot = VmSnapshot::new("vm-1", "web-01");
        snapshot.power_state = PowerState::PoweredOn;
        snapshot.cpu_usage_percent = Some(4.25);
        snapshot.last_boot_time = Some(Utc.with_ymd_and_hms(2026, 1, 15, 8, 30, 0).unwrap());
        snapshot
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key(SourceKind::Hypervisor, 3, "inventory");
        let b = cache_key(SourceKind::Hypervisor, 3, "inventory");
        assert_eq!(a, b);
        assert_eq!(a, "idlehunter:hypervisor:src3:inventory");
        assert_ne!(a, cache_key(SourceKind::OpsMonitor, 3, "inventory"));
        assert_ne!(a, cache_key(SourceKind::Hypervisor, 4, "inventory"));
    }

    #[test]
    fn test_set_get_round_trips_timestamps_and_metrics() {
        let cache = ResponseCache::new();
        let key = cache_key(SourceKind::Hypervisor, 1, "inventory");
        cache.set(&key, &[snapshot()], DEFAULT_TTL);

        let cached = cache.get(&key).expect("cache hit");
        assert_eq!(cached, vec![snapshot()]);
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache = ResponseCache::new();
        assert_eq!(cache.get("idlehunter:hypervisor:src9:inventory"), None);
    }

    #[test]
    fn test_expired_entry_falls_through() {
        let cache = ResponseCache::new();
        let key = cache_key(SourceKind::StorageMonitor, 2, "inventory");
        cache.set(&key, &[snapshot()], Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired_keeps_live_entries() {
        let cache = ResponseCache::new();
        cache.set("live", &[snapshot()], DEFAULT_TTL);
        cache.set("dead", &[snapshot()], Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(20));
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("live").is_some());
    }
}
