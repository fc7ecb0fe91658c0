//! Inventory and savings CLI commands

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, SavingsSummary, VmPage};
use crate::output::{
    color_score, color_status, format_metric, format_timestamp, print_table, print_warning,
    OutputFormat,
};

/// Row for the VM table
#[derive(Tabled, Serialize)]
struct VmRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "CPU %")]
    cpu: String,
    #[tabled(rename = "Net kbps")]
    network: String,
    #[tabled(rename = "Last seen")]
    last_seen: String,
}

/// List VMs with optional search, filter, sort and pagination
#[allow(clippy::too_many_arguments)]
pub async fn list_vms(
    client: &ApiClient,
    query: Option<String>,
    status: Option<String>,
    power: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
    page: usize,
    page_size: usize,
    format: OutputFormat,
) -> Result<()> {
    let mut params = vec![
        ("page".to_string(), page.to_string()),
        ("page_size".to_string(), page_size.to_string()),
    ];
    if let Some(query) = query {
        params.push(("q".to_string(), query));
    }
    if let Some(status) = status {
        params.push(("status".to_string(), status));
    }
    if let Some(power) = power {
        params.push(("power".to_string(), power));
    }
    if let Some(sort) = sort {
        params.push(("sort".to_string(), sort));
    }
    if let Some(dir) = dir {
        params.push(("dir".to_string(), dir));
    }

    let query_string: String = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let result: VmPage = client.get(&format!("vms?{query_string}")).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if result.records.is_empty() {
                print_warning("No VMs found");
                return Ok(());
            }

            let rows: Vec<VmRow> = result
                .records
                .iter()
                .map(|vm| VmRow {
                    name: vm.name.clone(),
                    source: vm.source_name.clone(),
                    power: vm.power_state.clone(),
                    status: color_status(&vm.status),
                    score: color_score(vm.idle_score),
                    cpu: format_metric(vm.cpu_usage_percent),
                    network: format_metric(vm.network_usage_kbps),
                    last_seen: format_timestamp(vm.last_observed_at.as_deref()),
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
            println!(
                "Page {}/{} ({} VMs total)",
                result.page, result.pages, result.total
            );
        }
    }

    Ok(())
}

/// Show the reclaimable-capacity estimate
pub async fn show_savings(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let savings: SavingsSummary = client.get("savings").await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&savings)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("Idle VMs:          {}", savings.idle_vms);
            println!("Reclaimable vCPUs: {}", savings.reclaimable_vcpus);
            println!("Reclaimable RAM:   {} GB", savings.reclaimable_ram_gb);
        }
    }

    Ok(())
}
