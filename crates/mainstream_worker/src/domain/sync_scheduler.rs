use crate::domain::{CycleReport, SyncCycle};
use common::domain::DomainResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs a sync cycle immediately and then once per interval.
///
/// Cycles run inline on the scheduler task, so at most one is in flight. After
/// a cycle that outlasts the interval, one catch-up cycle starts right away and
/// the remaining missed ticks are skipped.
pub struct SyncScheduler {
    cycle: Arc<dyn SyncCycle>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(cycle: Arc<dyn SyncCycle>, interval: Duration) -> Self {
        Self { cycle, interval }
    }

    /// Run exactly one cycle and log its outcome
    pub async fn run_once(&self) -> DomainResult<CycleReport> {
        let result = self.cycle.run_cycle().await;
        match &result {
            Ok(report) => info!(
                devices = report.devices,
                batch_stored = report.batch_stored,
                batch_skipped = report.batch_skipped,
                batch_envelope_rejected = report.batch_envelope_rejected,
                latest_stored = report.latest_stored,
                latest_empty = report.latest_empty,
                latest_skipped = report.latest_skipped,
                latest_failed = report.latest_failed,
                duration_ms = report.duration.as_millis() as u64,
                "main stream sync cycle completed"
            ),
            Err(e) => error!(error = %e, "main stream sync cycle failed"),
        }
        result
    }

    /// Loop until `cancel` fires. A failed cycle never ends the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "main stream sync scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("shutdown requested during main stream sync cycle, abandoning it");
                    break;
                }
                _ = self.run_once() => {}
            }

            let elapsed = started.elapsed();
            if elapsed > self.interval {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = self.interval.as_millis() as u64,
                    "main stream sync cycle overran its interval, skipping missed ticks"
                );
            }
        }

        info!("main stream sync scheduler stopped");
    }

    /// Start the loop on its own task
    pub fn spawn(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { self.run(cancel).await }
        });
        SchedulerHandle { cancel, task }
    }
}

pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the scheduler task to finish
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.task.await?;
        Ok(())
    }
}
