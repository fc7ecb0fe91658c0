//! Operations-monitoring REST API adapter
//!
//! Lists VM resources and maps named metric keys, with fallback aliases
//! for deployments that expose flattened key names.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{
    apply_auth, async_trait, base_url, http_client, join_url, metric_with_alias, ConnectionConfig,
    FetchFailure, FetchOutcome, SourceAdapter,
};
use crate::models::{PowerState, SourceKind, VmSnapshot};

/// Adapter for the operations-monitoring API
pub struct OpsMonitorAdapter;

impl OpsMonitorAdapter {
    pub const fn new() -> Self {
        Self
    }

    fn resolve_auth(config: &ConnectionConfig) -> (Option<String>, Option<String>, Option<String>) {
        (
            config.token_or_env("OPSMON_TOKEN"),
            config.user_or_env("OPSMON_USER"),
            config.password_or_env("OPSMON_PASSWORD"),
        )
    }

    fn snapshot_from(resource: OpsResource) -> Option<VmSnapshot> {
        let identity = resource
            .identifier
            .and_then(|id| id.uuid)
            .or(resource.resource_id)
            .unwrap_or_default();
        if identity.is_empty() {
            debug!("Skipping ops-monitor resource without an identifier");
            return None;
        }

        let name = resource
            .name
            .or(resource.resource_key.and_then(|key| key.name))
            .unwrap_or_default();
        let mut snapshot = VmSnapshot::new(identity, name);
        snapshot.power_state = resource
            .status_states
            .and_then(|states| states.power_state)
            .as_deref()
            .map(PowerState::parse)
            .unwrap_or(PowerState::Unknown);
        apply_metric_values(&mut snapshot, &resource.metrics);
        Some(snapshot)
    }
}

#[async_trait]
impl SourceAdapter for OpsMonitorAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::OpsMonitor
    }

    async fn fetch_inventory(&self, config: &ConnectionConfig) -> FetchOutcome {
        let endpoint = match config.endpoint_or_env("OPSMON_URL") {
            Some(endpoint) => endpoint,
            None => return FetchOutcome::Unavailable(FetchFailure::MissingConfig("endpoint")),
        };
        let base = match base_url(&endpoint, config.port) {
            Ok(base) => base,
            Err(failure) => return FetchOutcome::Unavailable(failure),
        };
        let url = match join_url(&base, "api/resources") {
            Ok(url) => url,
            Err(failure) => return FetchOutcome::Unavailable(failure),
        };
        let client = match http_client() {
            Ok(client) => client,
            Err(failure) => return FetchOutcome::Unavailable(failure),
        };

        let (token, user, password) = Self::resolve_auth(config);
        let request = apply_auth(
            client.get(url).query(&[
                ("resourceKind", "VirtualMachine"),
                ("pageSize", "1000"),
            ]),
            token.as_deref(),
            user.as_deref(),
            password.as_deref(),
        );
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Unavailable(FetchFailure::Transport(e.to_string())),
        };
        if !response.status().is_success() {
            return FetchOutcome::Unavailable(FetchFailure::Status(response.status().as_u16()));
        }

        let body: ResourceListBody = match response.json().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Unavailable(FetchFailure::Malformed(e.to_string())),
        };

        let snapshots = body
            .into_resources()
            .into_iter()
            .filter_map(Self::snapshot_from)
            .collect();
        FetchOutcome::Fetched(snapshots)
    }

    async fn fetch_metrics(&self, config: &ConnectionConfig, id: &str) -> Option<VmSnapshot> {
        if id.is_empty() {
            return None;
        }
        let endpoint = config.endpoint_or_env("OPSMON_URL")?;
        let base = base_url(&endpoint, config.port).ok()?;
        let url = join_url(&base, &format!("api/resources/{id}/metrics/latest")).ok()?;
        let client = http_client().ok()?;

        let (token, user, password) = Self::resolve_auth(config);
        let request = apply_auth(
            client.get(url),
            token.as_deref(),
            user.as_deref(),
            password.as_deref(),
        );
        let response = request.send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: MetricsBody = response.json().await.ok()?;

        let mut snapshot = VmSnapshot::new(id, "");
        apply_metric_values(&mut snapshot, &body.into_values());
        Some(snapshot)
    }
}

fn apply_metric_values(snapshot: &mut VmSnapshot, values: &serde_json::Map<String, Value>) {
    snapshot.cpu_usage_percent = metric_with_alias(values, "cpu|usage_average", "cpu_usage");
    snapshot.memory_usage_mb = metric_with_alias(values, "mem|consumed_average", "memory_consumed");
    snapshot.memory_usage_percent = metric_with_alias(values, "mem|usage_average", "memory_usage");
    snapshot.network_usage_kbps = metric_with_alias(values, "net|usage_average", "network_usage");
    snapshot.disk_usage_iops =
        metric_with_alias(values, "disk|commandsAveraged_average", "disk_iops");
    snapshot.disk_read_kbps = metric_with_alias(values, "disk|read_average", "disk_read");
    snapshot.disk_write_kbps = metric_with_alias(values, "disk|write_average", "disk_write");
}

#[derive(Debug, Deserialize)]
struct OpsResource {
    name: Option<String>,
    #[serde(rename = "resourceKey")]
    resource_key: Option<OpsResourceKey>,
    identifier: Option<OpsIdentifier>,
    #[serde(rename = "resourceId")]
    resource_id: Option<String>,
    #[serde(rename = "resourceStatusStates")]
    status_states: Option<OpsStatusStates>,
    #[serde(default)]
    metrics: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct OpsResourceKey {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpsIdentifier {
    uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpsStatusStates {
    #[serde(rename = "powerState")]
    power_state: Option<String>,
}

/// The list endpoint returns `{"resourceList": [...]}` or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResourceListBody {
    Wrapped {
        #[serde(rename = "resourceList")]
        resource_list: Vec<OpsResource>,
    },
    Bare(Vec<OpsResource>),
}

impl ResourceListBody {
    fn into_resources(self) -> Vec<OpsResource> {
        match self {
            ResourceListBody::Wrapped { resource_list } => resource_list,
            ResourceListBody::Bare(resources) => resources,
        }
    }
}

/// The metrics endpoint returns `{"values": {...}}` or a bare object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetricsBody {
    Wrapped {
        values: serde_json::Map<String, Value>,
    },
    Bare(serde_json::Map<String, Value>),
}

impl MetricsBody {
    fn into_values(self) -> serde_json::Map<String, Value> {
        match self {
            MetricsBody::Wrapped { values } => values,
            MetricsBody::Bare(values) => values,
        }
    }
}
