//! Access-log accounting pipeline
//!
//! Each run rotates the live access log away, aggregates the rotated file
//! per user, reports every aggregate to the RADIUS accounting server as a
//! Start/Stop pair, and finally archives the rotation backlog. A failing
//! user is logged and skipped; a failing stage aborts the run and leaves the
//! sources on disk for the next tick.

pub mod archive;
pub mod parse;

pub use archive::{archive_rotated_logs, DEFAULT_MAX_BACKUPS};
pub use parse::parse_rotated_log;

use crate::accesslog::AccessLogger;
use crate::radius::AccountingSink;
use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// The rotate -> parse -> emit -> archive pipeline
pub struct AccountingPipeline {
    access_log: Arc<AccessLogger>,
    sink: Arc<dyn AccountingSink>,
    log_dir: PathBuf,
    max_backups: usize,
}

impl AccountingPipeline {
    /// Build a pipeline over the live access log and an accounting sink
    pub fn new(
        access_log: Arc<AccessLogger>,
        sink: Arc<dyn AccountingSink>,
        log_dir: PathBuf,
        max_backups: usize,
    ) -> Self {
        AccountingPipeline {
            access_log,
            sink,
            log_dir,
            max_backups,
        }
    }

    /// Execute one run; failures are logged, never propagated
    pub async fn run(&self) {
        if let Err(e) = self.run_inner().await {
            warn!("Accounting run failed: {:#}", e);
        }
    }

    async fn run_inner(&self) -> Result<()> {
        let rotated = self.rotate()?;
        let stats = parse_rotated_log(&rotated)
            .with_context(|| format!("Failed to parse {}", rotated.display()))?;

        for (username, total_bytes) in &stats {
            match self.sink.send_usage(username, *total_bytes).await {
                Ok(()) => info!("Sent accounting data for {}", username),
                Err(e) => warn!("Failed to send accounting data for {}: {}", username, e),
            }
        }

        archive_rotated_logs(&self.log_dir, self.max_backups)
    }

    /// Rename the live log to its dated rotation and reopen it
    fn rotate(&self) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let rotated = self.log_dir.join(format!("access-{}.log", stamp));
        self.access_log
            .rotate_to(&rotated)
            .with_context(|| format!("Failed to rotate access log to {}", rotated.display()))?;
        Ok(rotated)
    }
}
