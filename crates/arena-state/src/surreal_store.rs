//! SurrealDB-backed implementation of the arena storage traits
//!
//! One handle serves [`RankingStore`], [`BattleLedger`] and
//! [`SettlementLedger`]. Compare-and-swap and outbox transitions are single
//! conditional `UPDATE ... WHERE` statements, so SurrealDB's per-statement
//! atomicity is what makes them safe under concurrency.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle;
use crate::schema::{AgentStatsRow, BattleRow, SettlementRow};
use crate::storage_traits::{
    AgentId, AgentStats, BattleId, BattleLedger, BattleRecord, RankingStore, SettlementLedger,
    SettlementRecord, SettlementResolution, SettlementStatus, StorageResult, VersionedStats,
};

/// Fields written by a stats compare-and-swap.
#[derive(Debug, Serialize)]
struct StatsPatch {
    total_battles: u64,
    wins: u64,
    losses: u64,
    ties: u64,
    avg_score: f64,
    kill_offs: u64,
    rank: Option<u32>,
    version: u64,
    updated_at: SurrealDatetime,
}

/// Fields written when a claimed settlement finishes.
#[derive(Debug, Serialize)]
struct SettlementPatch {
    status: String,
    tx_hash: Option<String>,
    detail: Option<String>,
    settled_at: SurrealDatetime,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn is_unique_violation(e: &surrealdb::Error) -> bool {
    let msg = e.to_string();
    msg.contains("already contains") || msg.contains("already exists")
}

/// SurrealDB-backed arena store.
#[derive(Clone)]
pub struct SurrealArenaStore {
    db: Surreal<Any>,
}

impl SurrealArenaStore {
    /// Wrap an already-migrated connection.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// In-memory instance (`mem://`), schema applied. Used by tests.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_in_memory().await?;
        info!("SurrealArenaStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect using the environment chain from [`handle::connect_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_stats_row(&self, agent_id: &str) -> StorageResult<Option<AgentStatsRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM agent_stats WHERE agent_id = $aid")
            .bind(("aid", agent_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<AgentStatsRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_settlement_row(&self, battle_id: &str) -> StorageResult<Option<SettlementRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM settlements WHERE battle_id = $bid")
            .bind(("bid", battle_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<SettlementRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    async fn conflict(&self, agent_id: &AgentId, expected: Option<u64>) -> StorageError {
        let found = match self.fetch_stats_row(agent_id.as_str()).await {
            Ok(row) => row.map(|r| r.version),
            Err(e) => return e,
        };
        StorageError::VersionConflict {
            agent_id: agent_id.0.clone(),
            expected,
            found,
        }
    }
}

#[async_trait]
impl RankingStore for SurrealArenaStore {
    async fn get_stats(&self, agent_id: &AgentId) -> StorageResult<Option<VersionedStats>> {
        Ok(self
            .fetch_stats_row(agent_id.as_str())
            .await?
            .map(AgentStatsRow::into_versioned))
    }

    async fn put_stats(
        &self,
        stats: AgentStats,
        expected_version: Option<u64>,
    ) -> StorageResult<u64> {
        let agent_id = stats.agent_id.clone();

        let Some(expected) = expected_version else {
            debug!(agent_id = %agent_id, "creating stats row");
            let row = AgentStatsRow::from_stats(stats, 1);
            let created: Result<Option<AgentStatsRow>, surrealdb::Error> =
                self.db.create("agent_stats").content(row).await;
            return match created {
                Ok(_) => Ok(1),
                Err(e) if is_unique_violation(&e) => Err(self.conflict(&agent_id, None).await),
                Err(e) => Err(backend(e)),
            };
        };

        let next = expected + 1;
        let patch = StatsPatch {
            total_battles: stats.total_battles,
            wins: stats.wins,
            losses: stats.losses,
            ties: stats.ties,
            avg_score: stats.avg_score,
            kill_offs: stats.kill_offs,
            rank: stats.rank,
            version: next,
            updated_at: SurrealDatetime::from(stats.updated_at),
        };

        let mut res = self
            .db
            .query(
                "UPDATE agent_stats MERGE $patch \
                 WHERE agent_id = $aid AND version = $expected RETURN AFTER",
            )
            .bind(("patch", patch))
            .bind(("aid", agent_id.0.clone()))
            .bind(("expected", expected))
            .await
            .map_err(backend)?;
        let rows: Vec<AgentStatsRow> = res.take(0).map_err(backend)?;

        if rows.is_empty() {
            return Err(self.conflict(&agent_id, Some(expected)).await);
        }
        Ok(next)
    }

    async fn list_stats(&self) -> StorageResult<Vec<AgentStats>> {
        let mut res = self
            .db
            .query("SELECT * FROM agent_stats")
            .await
            .map_err(backend)?;
        let rows: Vec<AgentStatsRow> = res.take(0).map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_versioned().stats)
            .collect())
    }

    async fn assign_ranks(&self, ranks: &[(AgentId, u32)]) -> StorageResult<()> {
        for (agent_id, rank) in ranks {
            self.db
                .query("UPDATE agent_stats SET rank = $rank WHERE agent_id = $aid")
                .bind(("rank", *rank))
                .bind(("aid", agent_id.0.clone()))
                .await
                .map_err(backend)?
                .check()
                .map_err(backend)?;
        }
        Ok(())
    }
}

#[async_trait]
impl BattleLedger for SurrealArenaStore {
    async fn record_battle(&self, record: &BattleRecord) -> StorageResult<()> {
        let row = BattleRow::from_record(record);
        let created: Result<Option<BattleRow>, surrealdb::Error> =
            self.db.create("battles").content(row).await;
        match created {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::DuplicateBattle {
                battle_id: record.battle_id.0.clone(),
            }),
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_battle(&self, battle_id: &BattleId) -> StorageResult<BattleRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM battles WHERE battle_id = $bid")
            .bind(("bid", battle_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<BattleRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .map(BattleRow::into_record)
            .ok_or_else(|| StorageError::BattleNotFound {
                battle_id: battle_id.0.clone(),
            })
    }

    async fn list_battles(&self, agent: Option<&AgentId>) -> StorageResult<Vec<BattleRecord>> {
        let rows: Vec<BattleRow> = if let Some(agent) = agent {
            let mut res = self
                .db
                .query(
                    "SELECT * FROM battles WHERE agent_a = $aid OR agent_b = $aid \
                     ORDER BY created_at DESC",
                )
                .bind(("aid", agent.0.clone()))
                .await
                .map_err(backend)?;
            res.take(0).map_err(backend)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM battles ORDER BY created_at DESC")
                .await
                .map_err(backend)?;
            res.take(0).map_err(backend)?
        };
        Ok(rows.into_iter().map(BattleRow::into_record).collect())
    }
}

#[async_trait]
impl SettlementLedger for SurrealArenaStore {
    async fn enqueue(&self, record: SettlementRecord) -> StorageResult<bool> {
        if self
            .fetch_settlement_row(record.battle_id.as_str())
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let row = SettlementRow::from_record(&record);
        let created: Result<Option<SettlementRow>, surrealdb::Error> =
            self.db.create("settlements").content(row).await;
        match created {
            Ok(_) => Ok(true),
            // Lost the race to a concurrent enqueue for the same battle.
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(backend(e)),
        }
    }

    async fn claim(&self, battle_id: &BattleId) -> StorageResult<Option<SettlementRecord>> {
        let mut res = self
            .db
            .query(
                "UPDATE settlements SET status = $in_flight \
                 WHERE battle_id = $bid AND status = $pending RETURN AFTER",
            )
            .bind(("in_flight", SettlementStatus::InFlight.as_str()))
            .bind(("pending", SettlementStatus::Pending.as_str()))
            .bind(("bid", battle_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<SettlementRow> = res.take(0).map_err(backend)?;

        if let Some(row) = rows.into_iter().next() {
            return row.into_record().map(Some);
        }
        match self.fetch_settlement_row(battle_id.as_str()).await? {
            Some(_) => Ok(None),
            None => Err(StorageError::SettlementNotFound {
                battle_id: battle_id.0.clone(),
            }),
        }
    }

    async fn complete(
        &self,
        battle_id: &BattleId,
        resolution: SettlementResolution,
    ) -> StorageResult<SettlementRecord> {
        let status = resolution.status();
        let (tx_hash, detail) = match resolution {
            SettlementResolution::Success { tx_hash } => (Some(tx_hash), None),
            SettlementResolution::Skipped { reason } => (None, Some(reason)),
            SettlementResolution::Error { error } => (None, Some(error)),
        };
        let patch = SettlementPatch {
            status: status.as_str().to_string(),
            tx_hash,
            detail,
            settled_at: SurrealDatetime::from(Utc::now()),
        };

        let mut res = self
            .db
            .query(
                "UPDATE settlements MERGE $patch \
                 WHERE battle_id = $bid AND status = $in_flight RETURN AFTER",
            )
            .bind(("patch", patch))
            .bind(("bid", battle_id.0.clone()))
            .bind(("in_flight", SettlementStatus::InFlight.as_str()))
            .await
            .map_err(backend)?;
        let rows: Vec<SettlementRow> = res.take(0).map_err(backend)?;

        if let Some(row) = rows.into_iter().next() {
            return row.into_record();
        }
        match self.fetch_settlement_row(battle_id.as_str()).await? {
            Some(row) => Err(StorageError::InvalidSettlementState {
                battle_id: battle_id.0.clone(),
                status: row.status,
                expected: SettlementStatus::InFlight.to_string(),
            }),
            None => Err(StorageError::SettlementNotFound {
                battle_id: battle_id.0.clone(),
            }),
        }
    }

    async fn get_settlement(
        &self,
        battle_id: &BattleId,
    ) -> StorageResult<Option<SettlementRecord>> {
        self.fetch_settlement_row(battle_id.as_str())
            .await?
            .map(SettlementRow::into_record)
            .transpose()
    }

    async fn pending_settlements(&self) -> StorageResult<Vec<SettlementRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM settlements WHERE status = $pending ORDER BY created_at ASC")
            .bind(("pending", SettlementStatus::Pending.as_str()))
            .await
            .map_err(backend)?;
        let rows: Vec<SettlementRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(SettlementRow::into_record).collect()
    }
}
