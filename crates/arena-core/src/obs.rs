//! Structured observability hooks for the battle lifecycle.
//!
//! This module provides:
//! - Battle-scoped tracing spans via the `BattleSpan` RAII guard
//! - Emission functions for lifecycle events: evaluation, ranking, settlement
//!
//! Events are emitted at `info!` level, skips and failures at `warn!`.
//! Filtering follows `RUST_LOG`; JSON output is selected in `telemetry`.

use tracing::{info, warn};

/// RAII guard that enters a battle-scoped span for the duration of a battle.
///
/// # Example
///
/// ```ignore
/// let _span = BattleSpan::enter("b-123");
/// // every event below carries battle_id = "b-123"
/// ```
pub struct BattleSpan {
    _span: tracing::span::EnteredSpan,
}

impl BattleSpan {
    /// Create and enter a span tagged with the battle id.
    ///
    /// The guard is `!Send`; across `.await` points use [`BattleSpan::span`]
    /// with `tracing::Instrument` instead.
    pub fn enter(battle_id: &str) -> Self {
        Self {
            _span: Self::span(battle_id).entered(),
        }
    }

    /// The battle span itself, for instrumenting futures.
    pub fn span(battle_id: &str) -> tracing::Span {
        tracing::info_span!("arena.battle", battle_id = %battle_id)
    }
}

/// Emit event: battle evaluated.
///
/// ```ignore
/// emit_battle_evaluated("b-1", "debate", "krumpa", 2.3, 3);
/// // logs: event=battle.evaluated battle_id=b-1 format=debate winner=krumpa ...
/// ```
pub fn emit_battle_evaluated(battle_id: &str, format: &str, winner: &str, margin: f64, rounds: usize) {
    info!(
        event = "battle.evaluated",
        battle_id = %battle_id,
        format = %format,
        winner = %winner,
        margin = margin,
        rounds = rounds,
    );
}

/// Emit event: one participant's stats written.
pub fn emit_ranking_updated(agent_id: &str, total_battles: u64, avg_score: f64, version: u64) {
    info!(
        event = "ranking.updated",
        agent_id = %agent_id,
        total_battles = total_battles,
        avg_score = avg_score,
        version = version,
    );
}

/// Emit event: a participant's stats update was skipped (warning level).
pub fn emit_ranking_skipped(agent_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "ranking.skipped", agent_id = %agent_id, reason = %reason);
}

/// Emit event: settlement written to the outbox.
pub fn emit_settlement_enqueued(battle_id: &str, winner: &str, token: &str) {
    info!(
        event = "settlement.enqueued",
        battle_id = %battle_id,
        winner = %winner,
        token = %token,
    );
}

/// Emit event: settlement reached a terminal status after a payout call.
///
/// Anything other than `success` is logged at warning level with its detail.
pub fn emit_settlement_finished(
    battle_id: &str,
    status: &str,
    tx_hash: Option<&str>,
    detail: Option<&str>,
) {
    if status == "success" {
        info!(
            event = "settlement.finished",
            battle_id = %battle_id,
            status = %status,
            tx_hash = tx_hash.unwrap_or(""),
        );
    } else {
        warn!(
            event = "settlement.finished",
            battle_id = %battle_id,
            status = %status,
            detail = detail.unwrap_or(""),
        );
    }
}

/// Emit event: settlement skipped without a payout call (warning level).
pub fn emit_settlement_skipped(battle_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "settlement.skipped", battle_id = %battle_id, reason = %reason);
}
