//! Recurring scan loop
//!
//! Drives the orchestrator on a configurable interval (daily by default)
//! with jitter, until shutdown is signalled. On-demand scans go through
//! the same orchestrator and are unaffected by this loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use crate::health::HealthRegistry;
use crate::observability::StructuredLogger;
use crate::scan::ScanOrchestrator;

/// Configuration for the scan loop
#[derive(Debug, Clone)]
pub struct ScanLoopConfig {
    /// Base scan interval (default: 24 hours)
    pub interval: Duration,
    /// Maximum jitter added to the interval (default: 5 minutes)
    pub jitter: Duration,
}

impl Default for ScanLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            jitter: Duration::from_secs(5 * 60),
        }
    }
}

/// Periodically runs a full scan across all enabled sources
pub struct ScanLoop {
    orchestrator: Arc<ScanOrchestrator>,
    config: ScanLoopConfig,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
}

impl ScanLoop {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, config: ScanLoopConfig) -> Self {
        Self {
            orchestrator,
            config,
            health: None,
            logger: StructuredLogger::new("scan-loop"),
        }
    }

    /// Report sweep outcomes into the health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until the shutdown channel fires; first sweep is immediate
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting scan loop"
        );

        let mut ticker = interval(self.current_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                    // Re-jitter the next interval
                    ticker = interval(self.current_interval());
                    ticker.reset();
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scan loop");
                    break;
                }
            }
        }
    }

    /// One full sweep over all enabled sources
    pub async fn sweep(&self) {
        let started = std::time::Instant::now();
        let report = self.orchestrator.run_scan(None).await;
        let failed = report.failed_count();
        let sources = report.results.len();

        if let Some(health) = &self.health {
            health.note_scan_outcome(sources, failed).await;
        }
        if let Err(e) = self.orchestrator.inventory().flush() {
            warn!(error = %e, "Failed to flush inventory after sweep");
        }

        self.logger
            .log_scan_summary(sources, failed, started.elapsed().as_secs_f64());
    }

    /// Interval with jitter to avoid synchronized upstream load
    fn current_interval(&self) -> Duration {
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        self.config.interval + Duration::from_millis(jitter_ms)
    }
}

/// Generate a jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    // Time-seeded; uniformity is irrelevant at this cadence
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_loop_config_default() {
        let config = ScanLoopConfig::default();
        assert_eq!(config.interval, Duration::from_secs(86_400));
        assert_eq!(config.jitter, Duration::from_secs(300));
    }

    #[test]
    fn test_rand_jitter() {
        let jitter = rand_jitter(1000);
        assert!(jitter < 1000);

        // Zero max should return zero
        assert_eq!(rand_jitter(0), 0);
    }
}
