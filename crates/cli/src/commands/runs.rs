//! Run-ledger and source CLI commands

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, RunRecord, SourceSummary};
use crate::output::{color_status, format_timestamp, print_table, print_warning, OutputFormat};

/// Row for the runs table
#[derive(Tabled, Serialize)]
struct RunRow {
    #[tabled(rename = "Run")]
    id: u64,
    #[tabled(rename = "Source")]
    source_id: u64,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Finished")]
    finished: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Row for the sources table
#[derive(Tabled, Serialize)]
struct SourceRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "VMs")]
    vm_count: usize,
    #[tabled(rename = "Last run")]
    last_run: String,
}

/// List scan runs, most recent first
pub async fn list_runs(
    client: &ApiClient,
    source_id: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let path = match source_id {
        Some(id) => format!("runs?source_id={id}"),
        None => "runs".to_string(),
    };
    let runs: Vec<RunRecord> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&runs)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if runs.is_empty() {
                print_warning("No scan runs recorded");
                return Ok(());
            }
            let rows: Vec<RunRow> = runs
                .iter()
                .map(|run| RunRow {
                    id: run.id,
                    source_id: run.source_id,
                    status: color_status(&run.status),
                    started: format_timestamp(Some(&run.started_at)),
                    finished: format_timestamp(run.finished_at.as_deref()),
                    message: run.message.clone(),
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}

/// List configured sources with inventory and run summaries
pub async fn list_sources(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let sources: Vec<SourceSummary> = client.get("sources").await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&sources)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if sources.is_empty() {
                print_warning("No sources configured");
                return Ok(());
            }
            let rows: Vec<SourceRow> = sources
                .iter()
                .map(|source| SourceRow {
                    id: source.id,
                    name: source.name.clone(),
                    kind: source.kind.clone(),
                    enabled: if source.enabled { "yes".into() } else { "no".into() },
                    vm_count: source.vm_count,
                    last_run: match (&source.last_run_status, &source.last_run_at) {
                        (Some(status), Some(at)) => format!(
                            "{} at {}",
                            color_status(status),
                            format_timestamp(Some(at))
                        ),
                        _ => "never".to_string(),
                    },
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}
