//! Source adapters for external inventory and metrics providers
//!
//! Each adapter normalizes one vendor API into the common [`VmSnapshot`]
//! shape. Adapters never propagate errors to the caller: every failure
//! mode (missing configuration, network, non-2xx, malformed body)
//! degrades to [`FetchOutcome::Unavailable`] with a reason, so a single
//! misbehaving source cannot abort a multi-source scan.

mod hypervisor;
mod opsmon;
mod storagemon;

pub use hypervisor::{HypervisorAdapter, DEFAULT_MHZ_PER_CORE};
pub use opsmon::OpsMonitorAdapter;
pub use storagemon::StorageMonitorAdapter;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::{SourceKind, VmSnapshot};

pub use async_trait::async_trait;

/// Fixed timeout for every upstream call; a timeout is a transport
/// failure and is not retried here (the outer schedule re-triggers).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for a source, each with an environment fallback
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint URL or bare hostname
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Name of the environment variable holding the password when it is
    /// not stored inline
    pub password_env: Option<String>,
    /// Bearer token, preferred over basic credentials when present
    pub token: Option<String>,
    pub api_key: Option<String>,
}

impl ConnectionConfig {
    pub fn endpoint_or_env(&self, var: &str) -> Option<String> {
        non_empty(self.endpoint.clone()).or_else(|| non_empty(std::env::var(var).ok()))
    }

    pub fn user_or_env(&self, var: &str) -> Option<String> {
        non_empty(self.user.clone()).or_else(|| non_empty(std::env::var(var).ok()))
    }

    /// Inline password, else the variable named by `password_env`, else `default_var`
    pub fn password_or_env(&self, default_var: &str) -> Option<String> {
        if let Some(password) = non_empty(self.password.clone()) {
            return Some(password);
        }
        let var = self.password_env.as_deref().unwrap_or(default_var);
        non_empty(std::env::var(var).ok())
    }

    pub fn token_or_env(&self, var: &str) -> Option<String> {
        non_empty(self.token.clone()).or_else(|| non_empty(std::env::var(var).ok()))
    }

    pub fn api_key_or_env(&self, var: &str) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var(var).ok()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Why an adapter returned no data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("missing connection setting: {0}")]
    MissingConfig(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {0} from upstream")]
    Status(u16),
    #[error("malformed response body: {0}")]
    Malformed(String),
}

/// Result of an inventory fetch: data, or an explicit reason for none
///
/// A `Fetched` with an empty list means the upstream genuinely reported
/// zero VMs and is still a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Vec<VmSnapshot>),
    Unavailable(FetchFailure),
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }

    /// Number of snapshots, or None when unavailable
    pub fn count(&self) -> Option<usize> {
        match self {
            FetchOutcome::Fetched(snapshots) => Some(snapshots.len()),
            FetchOutcome::Unavailable(_) => None,
        }
    }
}

/// Capability interface implemented once per source kind
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// List VMs with whatever metrics the source carries inline
    async fn fetch_inventory(&self, config: &ConnectionConfig) -> FetchOutcome;

    /// Fetch the latest metrics for one VM, when the source supports it
    async fn fetch_metrics(&self, _config: &ConnectionConfig, _id: &str) -> Option<VmSnapshot> {
        None
    }
}

/// Look up the adapter for a source kind
pub fn adapter_for(kind: SourceKind) -> &'static dyn SourceAdapter {
    static HYPERVISOR: HypervisorAdapter = HypervisorAdapter::new(DEFAULT_MHZ_PER_CORE);
    static OPS_MONITOR: OpsMonitorAdapter = OpsMonitorAdapter::new();
    static STORAGE_MONITOR: StorageMonitorAdapter = StorageMonitorAdapter::new();

    match kind {
        SourceKind::Hypervisor => &HYPERVISOR,
        SourceKind::OpsMonitor => &OPS_MONITOR,
        SourceKind::StorageMonitor => &STORAGE_MONITOR,
    }
}

/// Build the shared HTTP client with the fixed request timeout
pub(crate) fn http_client() -> Result<reqwest::Client, FetchFailure> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| FetchFailure::Transport(e.to_string()))
}

/// Normalize an endpoint into a base URL
///
/// Bare hostnames become `https://host:port`; explicit schemes are kept.
pub(crate) fn base_url(endpoint: &str, port: Option<u16>) -> Result<Url, FetchFailure> {
    let raw = endpoint.trim_end_matches('/');
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        match port {
            Some(port) => format!("https://{raw}:{port}"),
            None => format!("https://{raw}"),
        }
    };
    Url::parse(&with_scheme).map_err(|e| FetchFailure::Malformed(format!("bad endpoint: {e}")))
}

/// Join a path onto a base URL
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, FetchFailure> {
    base.join(path)
        .map_err(|e| FetchFailure::Malformed(format!("bad path {path}: {e}")))
}

/// Apply bearer token, else basic credentials, else no authentication
pub(crate) fn apply_auth(
    request: reqwest::RequestBuilder,
    token: Option<&str>,
    user: Option<&str>,
    password: Option<&str>,
) -> reqwest::RequestBuilder {
    if let Some(token) = token {
        request.bearer_auth(token)
    } else if let (Some(user), Some(password)) = (user, password) {
        request.basic_auth(user, Some(password))
    } else {
        request
    }
}

/// Read a JSON number as f64, tolerating integer and string encodings
pub(crate) fn metric_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a metric by its primary key, falling back to an alias
pub(crate) fn metric_with_alias(
    values: &serde_json::Map<String, serde_json::Value>,
    primary: &str,
    alias: &str,
) -> Option<f64> {
    values
        .get(primary)
        .and_then(metric_number)
        .or_else(|| values.get(alias).and_then(metric_number))
}
