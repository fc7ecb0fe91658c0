//! Hypervisor management API adapter
//!
//! Lists VMs with name, identity, power state, quick stats and boot time.
//! CPU percent is derived from raw MHz and the core count when the
//! upstream only reports MHz; uptime is derived from the boot timestamp.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{
    apply_auth, async_trait, base_url, http_client, join_url, ConnectionConfig, FetchFailure,
    FetchOutcome, SourceAdapter,
};
use crate::models::{PowerState, SourceKind, VmSnapshot};

/// MHz per core assumed when deriving CPU percent from raw MHz (2 GHz)
pub const DEFAULT_MHZ_PER_CORE: f64 = 2000.0;

const DEFAULT_PORT: u16 = 443;

/// Adapter for the hypervisor management API
pub struct HypervisorAdapter {
    mhz_per_core: f64,
}

impl HypervisorAdapter {
    pub const fn new(mhz_per_core: f64) -> Self {
        Self { mhz_per_core }
    }

    fn snapshot_from(&self, vm: HypervisorVm, now: DateTime<Utc>) -> Option<VmSnapshot> {
        let identity = vm.uuid.unwrap_or_default();
        if identity.is_empty() {
            debug!("Skipping hypervisor VM without a uuid");
            return None;
        }

        let mut snapshot = VmSnapshot::new(identity, vm.name.unwrap_or_default());
        snapshot.power_state = vm
            .power_state
            .as_deref()
            .map(PowerState::parse)
            .unwrap_or(PowerState::Unknown);
        snapshot.cpu_usage_mhz = vm.cpu_usage_mhz;
        snapshot.memory_usage_mb = vm.memory_usage_mb;

        if let (Some(mhz), Some(cores)) = (vm.cpu_usage_mhz, vm.num_cpus) {
            if cores > 0 {
                let percent = 100.0 * mhz / (cores as f64 * self.mhz_per_core);
                snapshot.cpu_usage_percent = Some(percent.min(100.0));
            }
        }
        if let (Some(used), Some(size)) = (vm.memory_usage_mb, vm.memory_size_mb) {
            if size > 0.0 {
                snapshot.memory_usage_percent = Some(round2(100.0 * used / size));
            }
        }

        if let Some(boot) = vm.boot_time.as_deref().and_then(parse_timestamp) {
            snapshot.last_boot_time = Some(boot);
            snapshot.uptime_days = Some((now - boot).num_seconds() as f64 / 86_400.0);
        }

        if let Some(cores) = vm.num_cpus {
            snapshot
                .attributes
                .insert("num_cpus".into(), serde_json::json!(cores));
        }
        if let Some(size) = vm.memory_size_mb {
            snapshot
                .attributes
                .insert("memory_size_mb".into(), serde_json::json!(size));
        }

        Some(snapshot)
    }
}

#[async_trait]
impl SourceAdapter for HypervisorAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Hypervisor
    }

    async fn fetch_inventory(&self, config: &ConnectionConfig) -> FetchOutcome {
        let host = match config.endpoint_or_env("HYPERVISOR_HOST") {
            Some(host) => host,
            None => return FetchOutcome::Unavailable(FetchFailure::MissingConfig("endpoint")),
        };
        let token = config.token_or_env("HYPERVISOR_TOKEN");
        let user = config.user_or_env("HYPERVISOR_USER");
        let password = config.password_or_env("HYPERVISOR_PASSWORD");
        if token.is_none() && (user.is_none() || password.is_none()) {
            return FetchOutcome::Unavailable(FetchFailure::MissingConfig("credentials"));
        }

        let port = config.port.unwrap_or(DEFAULT_PORT);
        let base = match base_url(&host, Some(port)) {
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

        let request = apply_auth(
            client.get(url),
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

        let body: VmListBody = match response.json().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Unavailable(FetchFailure::Malformed(e.to_string())),
        };

        let now = Utc::now();
        let snapshots = body
            .into_vms()
            .into_iter()
            .filter_map(|vm| self.snapshot_from(vm, now))
            .collect();
        FetchOutcome::Fetched(snapshots)
    }
}

#[derive(Debug, Deserialize)]
struct HypervisorVm {
    uuid: Option<String>,
    name: Option<String>,
    power_state: Option<String>,
    num_cpus: Option<u32>,
    memory_size_mb: Option<f64>,
    cpu_usage_mhz: Option<f64>,
    memory_usage_mb: Option<f64>,
    boot_time: Option<String>,
}

/// The list endpoint returns either a bare array or `{"vms": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VmListBody {
    Wrapped { vms: Vec<HypervisorVm> },
    Bare(Vec<HypervisorVm>),
}

impl VmListBody {
    fn into_vms(self) -> Vec<HypervisorVm> {
        match self {
            VmListBody::Wrapped { vms } => vms,
            VmListBody::Bare(vms) => vms,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(server: &mockito::ServerGuard) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: Some(server.url()),
            user: Some("scanner".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_inventory_maps_fields() {
        let mut server = mockito::Server::new_async().await;
        let boot = (Utc::now() - chrono::Duration::days(3)).to_rfc3339();
        let body = serde_json::json!({
            "vms": [{
                "uuid": "vm-1",
                "name": "web-01",
                "power_state": "poweredOn",
                "num_cpus": 2,
                "memory_size_mb": 4096.0,
                "cpu_usage_mhz": 400.0,
                "memory_usage_mb": 1024.0,
                "boot_time": boot,
            }]
        });
        let _mock = server
            .mock("GET", "/api/vms")
            .match_header("authorization", mockito::Matcher::Regex("Basic .+".into()))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let adapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
        let outcome = adapter.fetch_inventory(&config_for(&server)).await;

        let snapshots = match outcome {
            FetchOutcome::Fetched(snapshots) => snapshots,
            other => panic!("expected fetched, got {other:?}"),
        };
        assert_eq!(snapshots.len(), 1);
        let vm = &snapshots[0];
        assert_eq!(vm.identity, "vm-1");
        assert_eq!(vm.name, "web-01");
        assert_eq!(vm.power_state, PowerState::PoweredOn);
        // 400 MHz on 2 cores at 2000 MHz/core = 10%
        assert_eq!(vm.cpu_usage_percent, Some(10.0));
        assert_eq!(vm.memory_usage_percent, Some(25.0));
        assert!(vm.last_boot_time.is_some());
        assert!(vm.uptime_days.unwrap() > 2.9 && vm.uptime_days.unwrap() < 3.1);
        assert_eq!(vm.attributes["num_cpus"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_cpu_percent_capped_at_100() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/vms")
            .with_status(200)
            .with_body(
                serde_json::json!([{
                    "uuid": "vm-2",
                    "name": "busy",
                    "power_state": "poweredOn",
                    "num_cpus": 1,
                    "cpu_usage_mhz": 50_000.0,
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
        let outcome = adapter.fetch_inventory(&config_for(&server)).await;

        match outcome {
            FetchOutcome::Fetched(snapshots) => {
                assert_eq!(snapshots[0].cpu_usage_percent, Some(100.0));
            }
            other => panic!("expected fetched, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vm_without_uuid_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/vms")
            .with_status(200)
            .with_body(
                serde_json::json!([
                    {"name": "orphan"},
                    {"uuid": "vm-3", "name": "kept"},
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
        let outcome = adapter.fetch_inventory(&config_for(&server)).await;

        match outcome {
            FetchOutcome::Fetched(snapshots) => {
                assert_eq!(snapshots.len(), 1);
                assert_eq!(snapshots[0].identity, "vm-3");
            }
            other => panic!("expected fetched, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_explicit() {
        let adapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
        let outcome = adapter.fetch_inventory(&ConnectionConfig::default()).await;
        assert_eq!(
            outcome,
            FetchOutcome::Unavailable(FetchFailure::MissingConfig("endpoint"))
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_is_explicit() {
        let config = ConnectionConfig {
            endpoint: Some("https://vcenter.internal".into()),
            ..Default::default()
        };
        let adapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
        let outcome = adapter.fetch_inventory(&config).await;
        assert_eq!(
            outcome,
            FetchOutcome::Unavailable(FetchFailure::MissingConfig("credentials"))
        );
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/vms")
            .with_status(503)
            .create_async()
            .await;

        let adapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
        let outcome = adapter.fetch_inventory(&config_for(&server)).await;
        assert_eq!(
            outcome,
            FetchOutcome::Unavailable(FetchFailure::Status(503))
        );
    }

    #[tokio::test]
    async fn test_bearer_token_preferred_over_basic() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/vms")
            .match_header("authorization", "Bearer tok-123")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let mut config = config_for(&server);
        config.token = Some("tok-123".into());
        let adapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
        let outcome = adapter.fetch_inventory(&config).await;
        assert_eq!(outcome, FetchOutcome::Fetched(vec![]));
    }
}
