//! SAGA Timeout Watchdog
//!
//! Background scan for transfers stuck waiting on an account-service answer
//! that will never arrive. Each stuck leg is routed down its failure edge
//! through the orchestrator, which re-checks the saga status under the row
//! lock, so a real answer racing in between scan and resolution wins.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::error::TransferError;
use super::orchestrator::SagaOrchestrator;

/// Watchdog configuration
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How often to scan for stuck transfers
    pub scan_interval: Duration,
    /// How long a leg may wait before it counts as abandoned
    pub leg_timeout: Duration,
    /// Maximum transfers resolved per scan
    pub batch_size: i64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            leg_timeout: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

pub struct SagaTimeoutWorker {
    orchestrator: Arc<SagaOrchestrator>,
    config: WatchdogConfig,
}

impl SagaTimeoutWorker {
    pub fn new(orchestrator: Arc<SagaOrchestrator>, config: WatchdogConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Run the scan loop until the task is aborted.
    pub async fn run(self) {
        tracing::info!(
            scan_interval_ms = self.config.scan_interval.as_millis() as u64,
            leg_timeout_ms = self.config.leg_timeout.as_millis() as u64,
            "SAGA timeout watchdog started"
        );

        let mut ticker = interval(self.config.scan_interval);
        loop {
            ticker.tick().await;
            match self.scan_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(resolved = n, "Timed-out transfers resolved"),
                Err(e) => tracing::error!(error = %e, "Watchdog scan failed"),
            }
        }
    }

    /// One scan pass. Returns how many transfers were routed to resolution.
    pub async fn scan_once(&self) -> Result<usize, TransferError> {
        let stale = self
            .orchestrator
            .store()
            .find_stale_transfers(self.config.leg_timeout, self.config.batch_size)
            .await?;

        let mut resolved = 0;
        for transfer in &stale {
            tracing::warn!(
                transfer_id = %transfer.id(),
                saga_status = %transfer.saga_status(),
                "Transfer leg timed out, forcing failure path"
            );
            // One bad row must not stall the rest of the batch
            if let Err(e) = self.orchestrator.fail_timed_out(transfer).await {
                tracing::error!(
                    transfer_id = %transfer.id(),
                    error = %e,
                    "Failed to resolve timed-out transfer"
                );
            } else {
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}
