//! Settlement coordinator: decides whether and what to pay for a battle.
//!
//! A decisive battle produces one settlement record keyed by the battle id.
//! The record goes into the outbox first; dispatch claims it, calls the
//! payout service once and stores the terminal result. Nothing here ever
//! fails the battle: every problem ends up as a logged, structured status.

use std::str::FromStr;
use std::sync::Arc;

use arena_state::{
    AgentDirectory, AgentId, AgentProfile, BattleId, PayoutToken, SettlementLedger,
    SettlementRecord, SettlementResolution, SettlementStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::error::{ArenaError, Result};
use crate::domain::outcome::BattleOutcome;
use crate::metrics::METRICS;
use crate::obs::{emit_settlement_enqueued, emit_settlement_finished, emit_settlement_skipped};
use crate::settlement::payout::{PayoutService, TransferRequest};

/// Fixed amount moved from loser to winner, in token units.
pub const SETTLEMENT_AMOUNT: f64 = 0.0001;

/// When the payout call happens relative to battle creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    /// Dispatch immediately after enqueueing, inside battle creation.
    Inline,
    /// Enqueue only; a worker drains the outbox later.
    #[default]
    Deferred,
}

impl FromStr for SettlementMode {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(SettlementMode::Inline),
            "deferred" => Ok(SettlementMode::Deferred),
            other => Err(ArenaError::InvalidConfig(format!(
                "unknown settlement mode: {other}"
            ))),
        }
    }
}

pub struct SettlementCoordinator {
    directory: Arc<dyn AgentDirectory>,
    ledger: Arc<dyn SettlementLedger>,
    payout: Arc<dyn PayoutService>,
    mode: SettlementMode,
}

impl SettlementCoordinator {
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        ledger: Arc<dyn SettlementLedger>,
        payout: Arc<dyn PayoutService>,
        mode: SettlementMode,
    ) -> Self {
        Self {
            directory,
            ledger,
            payout,
            mode,
        }
    }

    pub fn mode(&self) -> SettlementMode {
        self.mode
    }

    pub fn ledger(&self) -> &Arc<dyn SettlementLedger> {
        &self.ledger
    }

    /// Settle a finished battle. Ties produce no settlement at all.
    ///
    /// Returns the record as it stands afterwards, or `None` when there is
    /// nothing to settle or the outbox could not be written.
    pub async fn on_battle(
        &self,
        battle_id: &BattleId,
        outcome: &BattleOutcome,
    ) -> Option<SettlementRecord> {
        let (Some(winner), Some(loser)) = (outcome.winner_id(), outcome.loser_id()) else {
            debug!(battle_id = %battle_id, "tie, nothing to settle");
            return None;
        };

        let record = match self.directory.get_agent(winner).await {
            Ok(Some(profile)) => SettlementRecord::pending(
                battle_id.clone(),
                winner.clone(),
                loser.clone(),
                profile.preferred_token(),
                SETTLEMENT_AMOUNT,
            ),
            Ok(None) => self
                .pending_default(battle_id, winner, loser)
                .skipped(format!("winner {winner} not found")),
            Err(e) => self
                .pending_default(battle_id, winner, loser)
                .skipped(format!("winner lookup failed: {e}")),
        };

        match self.ledger.enqueue(record.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(battle_id = %battle_id, "settlement already recorded");
                return self.ledger.get_settlement(battle_id).await.ok().flatten();
            }
            Err(e) => {
                METRICS.inc_settlements_failed();
                warn!(battle_id = %battle_id, error = %e, "could not enqueue settlement");
                return None;
            }
        }

        if record.status == SettlementStatus::Skipped {
            METRICS.inc_settlements_skipped();
            emit_settlement_skipped(
                battle_id.as_str(),
                &record.detail.as_deref().unwrap_or("skipped"),
            );
            return Some(record);
        }

        emit_settlement_enqueued(battle_id.as_str(), winner.as_str(), record.token.as_str());

        match self.mode {
            SettlementMode::Deferred => Some(record),
            SettlementMode::Inline => match self.dispatch(battle_id).await {
                Ok(Some(settled)) => Some(settled),
                Ok(None) => self.ledger.get_settlement(battle_id).await.ok().flatten(),
                Err(e) => {
                    warn!(battle_id = %battle_id, error = %e, "inline settlement failed");
                    // The claim may have landed, so report what the ledger holds.
                    match self.ledger.get_settlement(battle_id).await {
                        Ok(Some(current)) => Some(current),
                        _ => Some(record),
                    }
                }
            },
        }
    }

    /// Claim a pending settlement and make the single payout call for it.
    ///
    /// `Ok(None)` means another dispatcher already claimed the record.
    pub async fn dispatch(&self, battle_id: &BattleId) -> Result<Option<SettlementRecord>> {
        let Some(claimed) = self.ledger.claim(battle_id).await? else {
            debug!(battle_id = %battle_id, "settlement already claimed");
            return Ok(None);
        };

        let request = TransferRequest {
            battle_id: battle_id.clone(),
            from_wallet_ref: self
                .profile(&claimed.loser_id)
                .await
                .and_then(|p| p.wallet_ref),
            to_address: self
                .profile(&claimed.winner_id)
                .await
                .and_then(|p| p.wallet_address),
            token: claimed.token,
            amount: claimed.amount,
        };

        METRICS.inc_payout_calls();
        let resolution = SettlementResolution::from(self.payout.transfer(&request).await);
        let settled = self.ledger.complete(battle_id, resolution).await?;

        match settled.status {
            SettlementStatus::Success => METRICS.inc_settlements_succeeded(),
            SettlementStatus::Skipped => METRICS.inc_settlements_skipped(),
            _ => METRICS.inc_settlements_failed(),
        }
        emit_settlement_finished(
            battle_id.as_str(),
            settled.status.as_str(),
            settled.tx_hash.as_deref(),
            settled.detail.as_deref(),
        );

        Ok(Some(settled))
    }

    fn pending_default(
        &self,
        battle_id: &BattleId,
        winner: &AgentId,
        loser: &AgentId,
    ) -> SettlementRecord {
        SettlementRecord::pending(
            battle_id.clone(),
            winner.clone(),
            loser.clone(),
            PayoutToken::default(),
            SETTLEMENT_AMOUNT,
        )
    }

    async fn profile(&self, agent_id: &AgentId) -> Option<AgentProfile> {
        match self.directory.get_agent(agent_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "agent lookup failed during payout");
                None
            }
        }
    }
}
