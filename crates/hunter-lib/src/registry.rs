//! Registry of configured data sources

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::models::{Source, SourceId, SourceSpec};

/// In-process registry of sources, keyed by id
pub struct SourceRegistry {
    sources: DashMap<SourceId, Source>,
    next_id: AtomicU64,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a source, assigning the next id
    pub fn add(&self, spec: SourceSpec) -> Source {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let source = Source {
            id,
            name: spec.name,
            kind: spec.kind,
            enabled: spec.enabled,
            connection: spec.connection,
        };
        debug!(source_id = id, source = %source.name, kind = %source.kind, "Registering source");
        self.sources.insert(id, source.clone());
        source
    }

    pub fn get(&self, id: SourceId) -> Option<Source> {
        self.sources.get(&id).map(|entry| entry.clone())
    }

    /// All sources, ordered by id
    pub fn list(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .sources
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sources.sort_by_key(|source| source.id);
        sources
    }

    /// Enabled sources only, ordered by id
    pub fn enabled(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .sources
            .iter()
            .filter(|entry| entry.value().enabled)
            .map(|entry| entry.value().clone())
            .collect();
        sources.sort_by_key(|source| source.id);
        sources
    }

    /// Returns false when the source does not exist
    pub fn set_enabled(&self, id: SourceId, enabled: bool) -> bool {
        match self.sources.get_mut(&id) {
            Some(mut entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: SourceId) -> Option<Source> {
        self.sources.remove(&id).map(|(_, source)| source)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use crate::sources::ConnectionConfig;

    fn spec(name: &str, kind: SourceKind, enabled: bool) -> SourceSpec {
        SourceSpec {
            name: name.into(),
            kind,
            enabled,
            connection: ConnectionConfig::default(),
        }
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let registry = SourceRegistry::new();
        let a = registry.add(spec("vcenter-prod", SourceKind::Hypervisor, true));
        let b = registry.add(spec("ops-prod", SourceKind::OpsMonitor, true));
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_enabled_filters_and_orders() {
        let registry = SourceRegistry::new();
        registry.add(spec("a", SourceKind::Hypervisor, true));
        let disabled = registry.add(spec("b", SourceKind::OpsMonitor, false));
        registry.add(spec("c", SourceKind::StorageMonitor, true));

        let enabled = registry.enabled();
        assert_eq!(enabled.len(), 2);
        assert!(enabled.iter().all(|source| source.id != disabled.id));
        assert!(enabled[0].id < enabled[1].id);
    }

    #[test]
    fn test_set_enabled_and_remove() {
        let registry = SourceRegistry::new();
        let source = registry.add(spec("a", SourceKind::Hypervisor, true));

        assert!(registry.set_enabled(source.id, false));
        assert!(!registry.get(source.id).unwrap().enabled);
        assert!(!registry.set_enabled(999, true));

        assert!(registry.remove(source.id).is_some());
        assert!(registry.is_empty());
    }
}
