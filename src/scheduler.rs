//! Periodic sweeps over every account

use crate::account::{AccountProcessor, Credential};
use crate::logger;
use chrono::Local;
use std::time::Duration;

/// Outcome counts of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl CycleSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Runs every account in order, then sleeps for the check interval
pub struct CycleScheduler {
    processor: AccountProcessor,
    accounts: Vec<Credential>,
    interval: Duration,
    account_delay: Duration,
}

impl CycleScheduler {
    pub fn new(
        processor: AccountProcessor,
        accounts: Vec<Credential>,
        interval: Duration,
        account_delay: Duration,
    ) -> Self {
        Self {
            processor,
            accounts,
            interval,
            account_delay,
        }
    }

    /// Process each account once, pausing between accounts but not after
    /// the last one
    pub async fn run_cycle(&mut self) -> CycleSummary {
        logger::info("=== Starting multi-account speed test ===");
        let mut summary = CycleSummary::default();
        let count = self.accounts.len();

        for (index, credential) in self.accounts.iter().enumerate() {
            if self.processor.process(index, credential).await {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }

            if index + 1 < count && !self.account_delay.is_zero() {
                logger::info(format!(
                    "Waiting {} seconds before processing next account...",
                    self.account_delay.as_secs()
                ));
                tokio::time::sleep(self.account_delay).await;
            }
        }

        tracing::debug!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "cycle finished"
        );
        summary
    }

    /// Sweep, sleep, repeat; only returns when the task is dropped
    pub async fn run_forever(&mut self) {
        loop {
            let summary = self.run_cycle().await;
            logger::info(format!(
                "Accounts reported: {}/{}",
                summary.succeeded,
                summary.total()
            ));

            let next = Local::now()
                + chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::zero());
            logger::time(format!(
                "Next test cycle scheduled for: {}",
                next.format("%Y-%m-%d %H:%M:%S")
            ));
            logger::info(format!("Interval: {} minutes", self.interval.as_secs() / 60));
            logger::info("=== Speed test cycle complete ===");

            tokio::time::sleep(self.interval).await;
        }
    }
}
