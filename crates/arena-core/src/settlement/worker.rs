//! Outbox worker: drains pending settlements.
//!
//! Records are dispatched concurrently, bounded by a semaphore. Claiming
//! is what guarantees a single payout call per battle, so several workers
//! may drain the same outbox safely. Records left `in_flight` by a crash
//! are never picked up again.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use arena_state::SettlementStatus;

use crate::domain::error::Result;
use crate::metrics::METRICS;
use crate::settlement::coordinator::SettlementCoordinator;

/// Default cap on concurrent payout calls during a drain.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Tally of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Pending records seen at the start of the pass.
    pub pending: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Claimed by someone else first.
    pub already_claimed: usize,
    /// Outbox errors while claiming or completing.
    pub errors: usize,
}

impl DrainReport {
    pub fn dispatched(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Dispatch every pending settlement once.
#[instrument(skip(coordinator))]
pub async fn drain_pending(
    coordinator: &SettlementCoordinator,
    max_concurrent: usize,
) -> Result<DrainReport> {
    let pending = coordinator.ledger().pending_settlements().await?;
    let mut report = DrainReport {
        pending: pending.len(),
        ..DrainReport::default()
    };
    if pending.is_empty() {
        return Ok(report);
    }

    let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let results = join_all(pending.iter().map(|record| {
        let sem = Arc::clone(&sem);
        async move {
            let _permit = sem.acquire_owned().await.ok();
            (
                record.battle_id.clone(),
                coordinator.dispatch(&record.battle_id).await,
            )
        }
    }))
    .await;

    for (battle_id, result) in results {
        match result {
            Ok(Some(settled)) => match settled.status {
                SettlementStatus::Success => report.succeeded += 1,
                SettlementStatus::Skipped => report.skipped += 1,
                _ => report.failed += 1,
            },
            Ok(None) => report.already_claimed += 1,
            Err(e) => {
                warn!(battle_id = %battle_id, error = %e, "settlement dispatch failed");
                report.errors += 1;
            }
        }
    }

    info!(
        pending = report.pending,
        succeeded = report.succeeded,
        skipped = report.skipped,
        failed = report.failed,
        "settlement outbox drained"
    );
    Ok(report)
}

/// Poll the outbox every `interval` until `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_settlement_worker(
    coordinator: Arc<SettlementCoordinator>,
    interval: Duration,
    max_concurrent: usize,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = drain_pending(&coordinator, max_concurrent).await {
                        warn!(error = %e, "settlement drain failed");
                    }
                    METRICS.flush();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("settlement worker stopping");
                        break;
                    }
                }
            }
        }
    })
}
