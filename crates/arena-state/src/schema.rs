//! Row definitions for the arena SurrealDB tables
//!
//! Tables:
//! - agent_stats: running per-agent statistics (versioned)
//! - battles: immutable battle records
//! - settlements: settlement outbox
//!
//! Rows use plain strings for ids and enums; conversion to the
//! `storage_traits` types happens at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::{Datetime as SurrealDatetime, Thing};

use crate::error::StorageError;
use crate::storage_traits::{
    AgentId, AgentStats, BattleId, BattleRecord, SettlementRecord, SettlementStatus,
    StorageResult, VersionedStats,
};

/// `agent_stats` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatsRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub agent_id: String,
    pub total_battles: u64,
    pub wins: u64,
    pub losses: u64,
    pub ties: u64,
    pub avg_score: f64,
    pub kill_offs: u64,
    #[serde(default)]
    pub rank: Option<u32>,
    pub version: u64,
    pub updated_at: SurrealDatetime,
}

impl AgentStatsRow {
    pub fn from_stats(stats: AgentStats, version: u64) -> Self {
        Self {
            id: None,
            agent_id: stats.agent_id.0,
            total_battles: stats.total_battles,
            wins: stats.wins,
            losses: stats.losses,
            ties: stats.ties,
            avg_score: stats.avg_score,
            kill_offs: stats.kill_offs,
            rank: stats.rank,
            version,
            updated_at: SurrealDatetime::from(stats.updated_at),
        }
    }

    pub fn into_versioned(self) -> VersionedStats {
        VersionedStats {
            version: self.version,
            stats: AgentStats {
                agent_id: AgentId(self.agent_id),
                total_battles: self.total_battles,
                wins: self.wins,
                losses: self.losses,
                ties: self.ties,
                avg_score: self.avg_score,
                kill_offs: self.kill_offs,
                rank: self.rank,
                updated_at: DateTime::<Utc>::from(self.updated_at),
            },
        }
    }
}

/// `battles` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub battle_id: String,
    pub format_id: String,
    pub agent_a: String,
    pub agent_b: String,
    #[serde(default)]
    pub winner: Option<String>,
    pub outcome_digest: String,
    pub outcome: serde_json::Value,
    pub created_at: SurrealDatetime,
}

impl BattleRow {
    pub fn from_record(record: &BattleRecord) -> Self {
        Self {
            id: None,
            battle_id: record.battle_id.0.clone(),
            format_id: record.format_id.clone(),
            agent_a: record.agent_a.0.clone(),
            agent_b: record.agent_b.0.clone(),
            winner: record.winner.as_ref().map(|w| w.0.clone()),
            outcome_digest: record.outcome_digest.clone(),
            outcome: record.outcome.clone(),
            created_at: SurrealDatetime::from(record.created_at),
        }
    }

    pub fn into_record(self) -> BattleRecord {
        BattleRecord {
            battle_id: BattleId(self.battle_id),
            format_id: self.format_id,
            agent_a: AgentId(self.agent_a),
            agent_b: AgentId(self.agent_b),
            winner: self.winner.map(AgentId),
            outcome_digest: self.outcome_digest,
            outcome: self.outcome,
            created_at: DateTime::<Utc>::from(self.created_at),
        }
    }
}

/// `settlements` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub battle_id: String,
    pub winner_id: String,
    pub loser_id: String,
    pub token: String,
    pub amount: f64,
    pub status: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    pub created_at: SurrealDatetime,
    #[serde(default)]
    pub settled_at: Option<SurrealDatetime>,
}

impl SettlementRow {
    pub fn from_record(record: &SettlementRecord) -> Self {
        Self {
            id: None,
            battle_id: record.battle_id.0.clone(),
            winner_id: record.winner_id.0.clone(),
            loser_id: record.loser_id.0.clone(),
            token: record.token.as_str().to_string(),
            amount: record.amount,
            status: record.status.as_str().to_string(),
            tx_hash: record.tx_hash.clone(),
            detail: record.detail.clone(),
            created_at: SurrealDatetime::from(record.created_at),
            settled_at: record.settled_at.map(SurrealDatetime::from),
        }
    }

    pub fn into_record(self) -> StorageResult<SettlementRecord> {
        Ok(SettlementRecord {
            battle_id: BattleId(self.battle_id),
            winner_id: AgentId(self.winner_id),
            loser_id: AgentId(self.loser_id),
            token: self
                .token
                .parse()
                .map_err(|e: StorageError| StorageError::Backend(e.to_string()))?,
            amount: self.amount,
            status: self.status.parse::<SettlementStatus>()?,
            tx_hash: self.tx_hash,
            detail: self.detail,
            created_at: DateTime::<Utc>::from(self.created_at),
            settled_at: self.settled_at.map(DateTime::<Utc>::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_traits::PayoutToken;

    #[test]
    fn stats_row_keeps_counters_and_version() {
        let mut stats = AgentStats::new(AgentId::from("stomper"));
        stats.total_battles = 3;
        stats.wins = 2;
        stats.ties = 1;
        stats.avg_score = 6.5;
        stats.rank = Some(4);

        let versioned = AgentStatsRow::from_stats(stats.clone(), 7).into_versioned();
        assert_eq!(versioned.version, 7);
        assert_eq!(versioned.stats.total_battles, 3);
        assert_eq!(versioned.stats.wins, 2);
        assert_eq!(versioned.stats.rank, Some(4));
        assert_eq!(versioned.stats.avg_score, 6.5);
    }

    #[test]
    fn settlement_row_rejects_unknown_status() {
        let record = SettlementRecord::pending(
            BattleId::from("b"),
            AgentId::from("w"),
            AgentId::from("l"),
            PayoutToken::UsdcKrump,
            0.0001,
        );
        let mut row = SettlementRow::from_record(&record);
        assert_eq!(row.token, "usdc_krump");
        assert_eq!(row.status, "pending");

        row.status = "lost".to_string();
        assert!(row.into_record().is_err());
    }
}
