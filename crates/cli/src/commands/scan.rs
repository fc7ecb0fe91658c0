//! Scan and detection trigger commands

use anyhow::Result;

use crate::client::{ApiClient, DetectResponse, ScanReport, ScanRequest};
use crate::output::{print_error, print_success, OutputFormat};

/// Trigger a scan of one source or all enabled sources and report outcomes
pub async fn run_scan(
    client: &ApiClient,
    source_id: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let report: ScanReport = client.post("scan", &ScanRequest { source_id }).await?;

    if let OutputFormat::Json = format {
        let json = serde_json::to_string_pretty(&report)?;
        println!("{}", json);
        return Ok(());
    }

    if !report.ok {
        print_error(&report.error.unwrap_or_else(|| "scan failed".to_string()));
        return Ok(());
    }

    for result in &report.results {
        match result.status.as_str() {
            "success" => print_success(&format!(
                "source {}: {} VMs synced, {} reclassified (run {})",
                result.source_id,
                result.synced.unwrap_or(0),
                result.reclassified.unwrap_or(0),
                result.run_id
            )),
            _ => print_error(&format!(
                "source {}: {} (run {})",
                result.source_id,
                result.error.as_deref().unwrap_or("unknown error"),
                result.run_id
            )),
        }
    }
    Ok(())
}

/// Re-run classification over the whole inventory without fetching
pub async fn run_detect(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: DetectResponse = client.post("detect", &serde_json::json!({})).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&format!("Detection done, {} VM(s) updated", response.updated));
        }
    }
    Ok(())
}
