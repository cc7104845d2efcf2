//! Stale Transfer Sweeper
//!
//! Background task that moves records stuck in PENDING (the process died or
//! the store dropped out between record creation and commit) to FAILED.
//! A unit of work still in flight for a swept record fails its completion
//! CAS and rolls back, so a record never ends up both swept and completed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::events::TransferEvents;
use super::records::TransactionRecordStore;
use crate::error::LedgerError;

/// Reason stored on records the sweeper fails
pub const ABANDONED_REASON: &str = "abandoned: pending beyond stale threshold";

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to scan
    pub scan_interval: Duration,
    /// Age after which a PENDING record counts as abandoned
    pub stale_after: Duration,
    /// Maximum records handled per scan
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(300),
            batch_size: 100,
        }
    }
}

pub struct StaleTransferSweeper {
    records: TransactionRecordStore,
    events: Arc<dyn TransferEvents>,
    config: SweeperConfig,
}

impl StaleTransferSweeper {
    pub fn new(
        records: TransactionRecordStore,
        events: Arc<dyn TransferEvents>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            records,
            events,
            config,
        }
    }

    /// Scan until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "Starting stale transfer sweeper"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Stale transfer sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.scan_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Stale transfer sweeper stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One scan; returns how many records were failed.
    pub async fn run_once(&self) -> Result<usize, LedgerError> {
        let stale = self
            .records
            .find_stale_pending(self.config.stale_after, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale pending transactions");
            return Ok(0);
        }

        let mut swept = 0;
        for record in &stale {
            match self
                .records
                .mark_failed(record.transaction_id, ABANDONED_REASON)
                .await
            {
                Ok(true) => {
                    self.events.abandoned(record);
                    swept += 1;
                }
                // Completed or failed between the scan and the CAS
                Ok(false) => {}
                Err(e) => error!(
                    transaction_id = %record.transaction_id,
                    error = %e,
                    "Failed to abandon stale transaction"
                ),
            }
        }

        if swept > 0 {
            info!(count = swept, "Abandoned stale pending transactions");
        }
        Ok(swept)
    }
}
