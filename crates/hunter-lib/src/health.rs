//! Health check infrastructure for the scanner daemon
//!
//! Tracks per-component health for liveness and readiness probes. The
//! scanner component follows the outcome of the latest scan sweep.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Experiencing issues but still operational
    Degraded,
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn now(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::now(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::now(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::now(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SOURCES: &str = "sources";
    pub const INVENTORY: &str = "inventory";
    pub const SCANNER: &str = "scanner";
    pub const CACHE: &str = "cache";
}

/// Registry of component health, shared across the daemon
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    pub async fn set_component(&self, name: &str, health: ComponentHealth) {
        self.components.write().await.insert(name.to_string(), health);
    }

    /// Update the scanner component from a sweep outcome
    pub async fn note_scan_outcome(&self, sources: usize, failed: usize) {
        let health = if sources > 0 && failed == sources {
            ComponentHealth::unhealthy(format!("all {sources} source scans failed"))
        } else if failed > 0 {
            ComponentHealth::degraded(format!("{failed} of {sources} source scans failed"))
        } else {
            ComponentHealth::healthy()
        };
        self.set_component(components::SCANNER, health).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Aggregate health across all registered components
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();

        let mut status = ComponentStatus::Healthy;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => {
                    status = ComponentStatus::Unhealthy;
                    break;
                }
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }

        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        ReadinessResponse {
            ready,
            reason: (!ready).then(|| "initialization not complete".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_aggregates_worst_status() {
        let registry = HealthRegistry::new();
        registry.register(components::SOURCES).await;
        registry.register(components::SCANNER).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry
            .set_component(components::SCANNER, ComponentHealth::degraded("1 of 3 failed"))
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_component(components::SOURCES, ComponentHealth::unhealthy("gone"))
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_scan_outcome_drives_scanner_health() {
        let registry = HealthRegistry::new();

        registry.note_scan_outcome(3, 0).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry.note_scan_outcome(3, 1).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.note_scan_outcome(3, 3).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_flag() {
        let registry = HealthRegistry::new();
        assert!(!registry.readiness().await.ready);
        assert!(registry.readiness().await.reason.is_some());

        registry.set_ready(true).await;
        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }
}
