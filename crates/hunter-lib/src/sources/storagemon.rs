//! Storage I/O monitoring API adapter
//!
//! Maps read/write throughput only; everything else stays unknown.

use serde::Deserialize;
use tracing::debug;

use super::{
    async_trait, base_url, http_client, join_url, ConnectionConfig, FetchFailure, FetchOutcome,
    SourceAdapter,
};
use crate::models::{SourceKind, VmSnapshot};

const API_KEY_HEADER: &str = "X-Api-Key";

/// Adapter for the storage-monitoring API
pub struct StorageMonitorAdapter;

impl StorageMonitorAdapter {
    pub const fn new() -> Self {
        Self
    }

    fn snapshot_from(vm: StorageVm) -> Option<VmSnapshot> {
        let identity = vm.uuid.or(vm.id).unwrap_or_default();
        if identity.is_empty() {
            debug!("Skipping storage-monitor entry without an id");
            return None;
        }
        let mut snapshot = VmSnapshot::new(identity, vm.name.unwrap_or_default());
        snapshot.disk_read_kbps = vm.read_kbps;
        snapshot.disk_write_kbps = vm.write_kbps;
        Some(snapshot)
    }

    fn request(
        client: &reqwest::Client,
        url: url::Url,
        api_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let request = client.get(url);
        match api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

#[async_trait]
impl SourceAdapter for StorageMonitorAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::StorageMonitor
    }

    async fn fetch_inventory(&self, config: &ConnectionConfig) -> FetchOutcome {
        let endpoint = match config.endpoint_or_env("STORMON_URL") {
            Some(endpoint) => endpoint,
            None => return FetchOutcome::Unavailable(FetchFailure::MissingConfig("endpoint")),
        };
        let base = match base_url(&endpoint, config.port) {
            Ok(base) => base,
            Err(failure) => return FetchOutcome::Unavailable(failure),
        };
        let url = match join_url(&base, "api/vms") {
            Ok(url) => url,
            Err(failure) => return FetchOutcome::Unavailable(failure),
        };
        let client = match http_client() {
            Ok(client) => client,
            Err(failure) => return FetchOutcome::Unavailable(failure),
        };

        let api_key = config.api_key_or_env("STORMON_API_KEY");
        let response = match Self::request(&client, url, api_key.as_deref()).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Unavailable(FetchFailure::Transport(e.to_string())),
        };
        if !response.status().is_success() {
            return FetchOutcome::Unavailable(FetchFailure::Status(response.status().as_u16()));
        }

        let body: StorageListBody = match response.json().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Unavailable(FetchFailure::Malformed(e.to_string())),
        };

        let snapshots = body
            .into_vms()
            .into_iter()
            .filter_map(Self::snapshot_from)
            .collect();
        FetchOutcome::Fetched(snapshots)
    }

    async fn fetch_metrics(&self, config: &ConnectionConfig, id: &str) -> Option<VmSnapshot> {
        if id.is_empty() {
            return None;
        }
        let endpoint = config.endpoint_or_env("STORMON_URL")?;
        let base = base_url(&endpoint, config.port).ok()?;
        let url = join_url(&base, &format!("api/vms/{id}/metrics")).ok()?;
        let client = http_client().ok()?;

        let api_key = config.api_key_or_env("STORMON_API_KEY");
        let response = Self::request(&client, url, api_key.as_deref())
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: StorageMetrics = response.json().await.ok()?;

        let mut snapshot = VmSnapshot::new(id, "");
        snapshot.disk_read_kbps = body.read_kbps;
        snapshot.disk_write_kbps = body.write_kbps;
        Some(snapshot)
    }
}

#[derive(Debug, Deserialize)]
struct StorageVm {
    uuid: Option<String>,
    id: Option<String>,
    name: Option<String>,
    read_kbps: Option<f64>,
    write_kbps: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StorageMetrics {
    read_kbps: Option<f64>,
    write_kbps: Option<f64>,
}

/// The list endpoint returns `{"vms": [...]}` or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StorageListBody {
    Wrapped { vms: Vec<StorageVm> },
    Bare(Vec<StorageVm>),
}

impl StorageListBody {
    fn into_vms(self) -> Vec<StorageVm> {
        match self {
            StorageListBody::Wrapped { vms } => vms,
            StorageListBody::Bare(vms) => vms,
        }
    }
}
