//! API client for communicating with the hunterd daemon

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the hunterd daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmPage {
    pub records: Vec<VmRecord>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    pub source_id: u64,
    pub source_name: String,
    pub identity: String,
    pub name: String,
    pub power_state: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_usage_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_usage_iops: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: u64,
    pub source_id: u64,
    pub status: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub id: u64,
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub vm_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavingsSummary {
    pub idle_vms: usize,
    pub reclaimable_vcpus: u64,
    pub reclaimable_ram_gb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub results: Vec<ScanResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub source_id: u64,
    pub run_id: u64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclassified: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub updated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_parses_savings() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/savings")
            .with_status(200)
            .with_body(r#"{"idle_vms": 3, "reclaimable_vcpus": 12, "reclaimable_ram_gb": 24.5}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let savings: SavingsSummary = client.get("savings").await.unwrap();

        assert_eq!(savings.idle_vms, 3);
        assert_eq!(savings.reclaimable_vcpus, 12);
        assert_eq!(savings.reclaimable_ram_gb, 24.5);
    }

    #[tokio::test]
    async fn test_non_2xx_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/savings")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result: Result<SavingsSummary> = client.get("savings").await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("500"));
        assert!(err.contains("boom"));
    }
}
