//! Battle engine: one battle as a single sequential unit of work.
//!
//! `create_battle` evaluates the rounds, records the battle, folds the
//! outcome into the standings and hands it to settlement. Only evaluation
//! and recording can fail the call; ranking and settlement problems are
//! reported inside the returned [`BattleReport`].

use std::sync::Arc;

use arena_state::fakes::{MemoryBattleLedger, MemoryRankingStore, MemorySettlementLedger};
use arena_state::{
    AgentDirectory, BattleId, BattleLedger, BattleRecord, RankingStore, SettlementLedger,
    SettlementRecord, SurrealArenaStore,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::EngineConfig;
use crate::domain::error::Result;
use crate::domain::format::FormatRegistry;
use crate::domain::outcome::BattleOutcome;
use crate::domain::rubric::Rubric;
use crate::evaluator::{BattleEvaluator, BattleRequest};
use crate::judge::RoundJudge;
use crate::metrics::METRICS;
use crate::obs::{emit_battle_evaluated, BattleSpan};
use crate::ranking::{RankingAggregator, RankingUpdate, Standing};
use crate::scoring::TextScorer;
use crate::settlement::{
    drain_pending, spawn_settlement_worker, DrainReport, PayoutService, SettlementCoordinator,
};

/// Storage collaborators of the engine.
#[derive(Clone)]
pub struct EngineStores {
    pub directory: Arc<dyn AgentDirectory>,
    pub rankings: Arc<dyn RankingStore>,
    pub battles: Arc<dyn BattleLedger>,
    pub settlements: Arc<dyn SettlementLedger>,
}

impl EngineStores {
    /// In-memory stores around the given directory.
    pub fn in_memory(directory: Arc<dyn AgentDirectory>) -> Self {
        Self {
            directory,
            rankings: Arc::new(MemoryRankingStore::new()),
            battles: Arc::new(MemoryBattleLedger::new()),
            settlements: Arc::new(MemorySettlementLedger::new()),
        }
    }

    /// All persistent state in one SurrealDB store.
    pub fn surreal(directory: Arc<dyn AgentDirectory>, store: SurrealArenaStore) -> Self {
        let store = Arc::new(store);
        Self {
            directory,
            rankings: store.clone(),
            battles: store.clone(),
            settlements: store,
        }
    }
}

/// Everything produced by one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleReport {
    pub battle_id: BattleId,
    pub outcome: BattleOutcome,
    pub outcome_digest: String,
    pub ranking: RankingUpdate,
    /// `None` for ties or when the outbox could not be written.
    pub settlement: Option<SettlementRecord>,
}

pub struct BattleEngine {
    config: EngineConfig,
    evaluator: BattleEvaluator,
    battles: Arc<dyn BattleLedger>,
    ranking: RankingAggregator,
    settlement: Arc<SettlementCoordinator>,
}

impl BattleEngine {
    pub fn new(
        config: EngineConfig,
        rubric: Rubric,
        formats: FormatRegistry,
        stores: EngineStores,
        payout: Arc<dyn PayoutService>,
    ) -> Result<Self> {
        config.validate()?;
        let scorer = TextScorer::new(rubric, config.progression)?;
        let evaluator = BattleEvaluator::new(RoundJudge::new(scorer), formats);
        let ranking = RankingAggregator::new(
            stores.directory.clone(),
            stores.rankings.clone(),
            config.rank_index,
            config.ranking_max_attempts,
        );
        let settlement = Arc::new(SettlementCoordinator::new(
            stores.directory,
            stores.settlements,
            payout,
            config.settlement_mode,
        ));

        Ok(Self {
            config,
            evaluator,
            battles: stores.battles,
            ranking,
            settlement,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &BattleEvaluator {
        &self.evaluator
    }

    /// Score a battle without recording it or touching standings.
    pub fn evaluate(&self, request: &BattleRequest) -> Result<BattleOutcome> {
        self.evaluator.evaluate(request)
    }

    /// Run a battle under a fresh id.
    pub async fn create_battle(&self, request: BattleRequest) -> Result<BattleReport> {
        self.create_battle_with_id(BattleId::new(), request).await
    }

    /// Run a battle under a caller-chosen id. An id that was already
    /// recorded fails with `DuplicateBattle` before any standings change.
    pub async fn create_battle_with_id(
        &self,
        battle_id: BattleId,
        request: BattleRequest,
    ) -> Result<BattleReport> {
        let outcome = {
            let _span = BattleSpan::enter(battle_id.as_str());
            self.evaluator.evaluate(&request)?
        };

        self.persist_and_settle(battle_id.clone(), outcome)
            .instrument(BattleSpan::span(battle_id.as_str()))
            .await
    }

    async fn persist_and_settle(
        &self,
        battle_id: BattleId,
        outcome: BattleOutcome,
    ) -> Result<BattleReport> {
        METRICS.inc_battles_evaluated();
        if outcome.is_tie() {
            METRICS.inc_ties();
        }
        emit_battle_evaluated(
            battle_id.as_str(),
            &outcome.format_id,
            &outcome.winner.to_string(),
            outcome.win_margin,
            outcome.round_count(),
        );

        let outcome_digest = outcome.digest()?;
        let record = BattleRecord {
            battle_id: battle_id.clone(),
            format_id: outcome.format_id.clone(),
            agent_a: outcome.agent_a.agent_id.clone(),
            agent_b: outcome.agent_b.agent_id.clone(),
            winner: outcome.winner_id().cloned(),
            outcome_digest: outcome_digest.clone(),
            outcome: serde_json::to_value(&outcome)?,
            created_at: Utc::now(),
        };
        self.battles.record_battle(&record).await?;

        let ranking = self.ranking.apply(&outcome).await;
        let settlement = self.settlement.on_battle(&battle_id, &outcome).await;

        Ok(BattleReport {
            battle_id,
            outcome,
            outcome_digest,
            ranking,
            settlement,
        })
    }

    pub async fn get_battle(&self, battle_id: &BattleId) -> Result<BattleRecord> {
        Ok(self.battles.get_battle(battle_id).await?)
    }

    pub async fn get_settlement(&self, battle_id: &BattleId) -> Result<Option<SettlementRecord>> {
        Ok(self.settlement.ledger().get_settlement(battle_id).await?)
    }

    pub async fn standings(&self) -> Result<Vec<Standing>> {
        self.ranking.standings().await
    }

    /// Dispatch every pending settlement once.
    pub async fn settle_pending(&self) -> Result<DrainReport> {
        drain_pending(&self.settlement, self.config.max_concurrent_payouts).await
    }

    /// Background outbox worker using the configured interval.
    pub fn spawn_worker(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        spawn_settlement_worker(
            Arc::clone(&self.settlement),
            self.config.worker_interval,
            self.config.max_concurrent_payouts,
            shutdown,
        )
    }
}
