//! Global atomic counters for arena observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. after draining the settlement outbox).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    battles_evaluated: AtomicU64,
    ties: AtomicU64,
    ranking_conflicts: AtomicU64,
    ranking_skipped: AtomicU64,
    payout_calls: AtomicU64,
    settlements_succeeded: AtomicU64,
    settlements_skipped: AtomicU64,
    settlements_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! counter {
    ($inc:ident, $get:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = stringify!($field), "counter incremented");
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            battles_evaluated: AtomicU64::new(0),
            ties: AtomicU64::new(0),
            ranking_conflicts: AtomicU64::new(0),
            ranking_skipped: AtomicU64::new(0),
            payout_calls: AtomicU64::new(0),
            settlements_succeeded: AtomicU64::new(0),
            settlements_skipped: AtomicU64::new(0),
            settlements_failed: AtomicU64::new(0),
        }
    }

    counter!(inc_battles_evaluated, battles_evaluated, battles_evaluated);
    counter!(inc_ties, ties, ties);
    counter!(inc_ranking_conflicts, ranking_conflicts, ranking_conflicts);
    counter!(inc_ranking_skipped, ranking_skipped, ranking_skipped);
    counter!(inc_payout_calls, payout_calls, payout_calls);
    counter!(
        inc_settlements_succeeded,
        settlements_succeeded,
        settlements_succeeded
    );
    counter!(inc_settlements_skipped, settlements_skipped, settlements_skipped);
    counter!(inc_settlements_failed, settlements_failed, settlements_failed);

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a CLI command, worker tick)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            battles_evaluated = self.battles_evaluated(),
            ties = self.ties(),
            ranking_conflicts = self.ranking_conflicts(),
            ranking_skipped = self.ranking_skipped(),
            payout_calls = self.payout_calls(),
            settlements_succeeded = self.settlements_succeeded(),
            settlements_skipped = self.settlements_skipped(),
            settlements_failed = self.settlements_failed(),
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.battles_evaluated,
            &self.ties,
            &self.ranking_conflicts,
            &self.ranking_skipped,
            &self.payout_calls,
            &self.settlements_succeeded,
            &self.settlements_skipped,
            &self.settlements_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
