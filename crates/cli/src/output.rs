//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format an optional metric with fixed precision
pub fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.1}", value),
        None => "-".to_string(),
    }
}

/// Format an idle score, or a dash when not yet scored
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(score) => format!("{:.2}", score),
        None => "-".to_string(),
    }
}

/// Color a VM or run status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "active" | "success" | "running" => status.green().to_string(),
        "idle" | "pending" => status.yellow().to_string(),
        "missing" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color an idle score: red means reclaim candidate
pub fn color_score(score: Option<f64>) -> String {
    let formatted = format_score(score);
    match score {
        Some(score) if score >= 0.8 => formatted.red().to_string(),
        Some(score) if score >= 0.5 => formatted.yellow().to_string(),
        Some(_) => formatted.green().to_string(),
        None => formatted,
    }
}

/// Render an RFC 3339 timestamp as a compact date and time
pub fn format_timestamp(timestamp: Option<&str>) -> String {
    match timestamp {
        Some(ts) => chrono::DateTime::parse_from_rfc3339(ts)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| ts.to_string()),
        None => "never".to_string(),
    }
}
