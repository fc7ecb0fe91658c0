//! IdleHunter CLI
//!
//! A command-line tool for listing discovered VMs, inspecting scan runs,
//! triggering scans and viewing reclaimable-capacity estimates.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{inventory, runs, scan};

/// IdleHunter CLI
#[derive(Parser)]
#[command(name = "hunter")]
#[command(author, version, about = "CLI for IdleHunter idle VM detection", long_about = None)]
pub struct Cli {
    /// Daemon API endpoint URL (can also be set via HUNTER_API_URL env var)
    #[arg(long, env = "HUNTER_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List discovered VMs
    Vms {
        /// Search by VM or source name
        #[arg(long, short)]
        query: Option<String>,

        /// Filter by status bucket (all, zombie, idle, active, powered_off, missing)
        #[arg(long)]
        status: Option<String>,

        /// Filter by power-state substring (e.g. "off")
        #[arg(long)]
        power: Option<String>,

        /// Sort field (idle_score, name, source, power_state, last_seen)
        #[arg(long)]
        sort: Option<String>,

        /// Sort direction (asc, desc)
        #[arg(long)]
        dir: Option<String>,

        /// Page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Page size
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },

    /// List scan runs
    Runs {
        /// Only runs for this source id
        #[arg(long, short)]
        source: Option<u64>,
    },

    /// List configured sources
    Sources,

    /// Trigger a scan
    Scan {
        /// Scan only this source id (all enabled sources if omitted)
        #[arg(long, short)]
        source: Option<u64>,
    },

    /// Re-run idle detection without fetching
    Detect,

    /// Show reclaimable-capacity estimate
    Savings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Vms {
            query,
            status,
            power,
            sort,
            dir,
            page,
            page_size,
        } => {
            inventory::list_vms(
                &client, query, status, power, sort, dir, page, page_size, cli.format,
            )
            .await?;
        }
        Commands::Runs { source } => {
            runs::list_runs(&client, source, cli.format).await?;
        }
        Commands::Sources => {
            runs::list_sources(&client, cli.format).await?;
        }
        Commands::Scan { source } => {
            scan::run_scan(&client, source, cli.format).await?;
        }
        Commands::Detect => {
            scan::run_detect(&client, cli.format).await?;
        }
        Commands::Savings => {
            inventory::show_savings(&client, cli.format).await?;
        }
    }

    Ok(())
}
