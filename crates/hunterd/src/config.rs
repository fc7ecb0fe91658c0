//! Daemon configuration

use anyhow::{Context, Result};
use hunter_lib::detection::Thresholds;
use hunter_lib::models::SourceSpec;
use serde::Deserialize;
use tracing::warn;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HunterConfig {
    /// API server port for health/metrics/scan endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON file holding the configured sources
    #[serde(default = "default_sources_file")]
    pub sources_file: String,

    /// Optional JSON file persisting the inventory across restarts
    #[serde(default)]
    pub inventory_file: Option<String>,

    /// Scan interval in seconds (default: daily)
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Maximum jitter added to the scan interval, in seconds
    #[serde(default = "default_scan_jitter")]
    pub scan_jitter_secs: u64,

    /// Upstream response cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Classification thresholds
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_api_port() -> u16 {
    8080
}

fn default_sources_file() -> String {
    "sources.json".to_string()
}

fn default_scan_interval() -> u64 {
    24 * 60 * 60
}

fn default_scan_jitter() -> u64 {
    5 * 60
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            sources_file: default_sources_file(),
            inventory_file: None,
            scan_interval_secs: default_scan_interval(),
            scan_jitter_secs: default_scan_jitter(),
            cache_ttl_secs: default_cache_ttl(),
            thresholds: Thresholds::default(),
        }
    }
}

impl HunterConfig {
    /// Load configuration from HUNTER_-prefixed environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("HUNTER").separator("__"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}

/// Load source definitions from the configured JSON file
///
/// A missing file is not an error: the daemon starts with no sources and
/// logs the fact.
pub fn load_sources(path: &str) -> Result<Vec<SourceSpec>> {
    if !std::path::Path::new(path).exists() {
        warn!(path = %path, "Sources file not found, starting with no sources");
        return Ok(Vec::new());
    }
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read sources file {path}"))?;
    serde_json::from_slice(&data).with_context(|| format!("Failed to parse sources file {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hunter_lib::models::SourceKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HunterConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.scan_interval_secs, 86_400);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.thresholds.missing_days, 7);
    }

    #[test]
    fn test_load_sources_missing_file_is_empty() {
        let specs = load_sources("/nonexistent/sources.json").unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_load_sources_parses_specs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[
                {{"name": "vcenter-prod", "kind": "hypervisor",
                  "connection": {{"endpoint": "vcenter.internal", "user": "scanner"}}}},
                {{"name": "stormon", "kind": "storage-monitor", "enabled": false}}
            ]"#
        )
        .unwrap();

        let specs = load_sources(path.to_str().unwrap()).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].kind, SourceKind::Hypervisor);
        assert!(specs[0].enabled);
        assert_eq!(
            specs[0].connection.endpoint.as_deref(),
            Some("vcenter.internal")
        );
        assert!(!specs[1].enabled);
    }
}
