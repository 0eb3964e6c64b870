//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryAgentDirectory`, `MemoryRankingStore`, `MemoryBattleLedger`
//! and `MemorySettlementLedger` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryAgentDirectory
// ---------------------------------------------------------------------------

/// In-memory agent directory backed by a `HashMap<agent_id, profile>`.
#[derive(Debug, Default)]
pub struct MemoryAgentDirectory {
    agents: Mutex<HashMap<String, AgentProfile>>,
}

impl MemoryAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a list of profiles.
    pub fn with_agents(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        let dir = Self::new();
        for profile in profiles {
            dir.insert(profile);
        }
        dir
    }

    pub fn insert(&self, profile: AgentProfile) {
        let mut agents = self.agents.lock().unwrap();
        agents.insert(profile.agent_id.0.clone(), profile);
    }
}

#[async_trait]
impl AgentDirectory for MemoryAgentDirectory {
    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<Option<AgentProfile>> {
        let agents = self.agents.lock().unwrap();
        Ok(agents.get(agent_id.as_str()).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryRankingStore
// ---------------------------------------------------------------------------

/// In-memory ranking store backed by a `HashMap<agent_id, VersionedStats>`.
#[derive(Debug, Default)]
pub struct MemoryRankingStore {
    stats: Mutex<HashMap<String, VersionedStats>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    async fn get_stats(&self, agent_id: &AgentId) -> StorageResult<Option<VersionedStats>> {
        let stats = self.stats.lock().unwrap();
        Ok(stats.get(agent_id.as_str()).cloned())
    }

    async fn put_stats(
        &self,
        new_stats: AgentStats,
        expected_version: Option<u64>,
    ) -> StorageResult<u64> {
        let mut stats = self.stats.lock().unwrap();
        let found = stats.get(new_stats.agent_id.as_str()).map(|v| v.version);
        if found != expected_version {
            return Err(StorageError::VersionConflict {
                agent_id: new_stats.agent_id.0.clone(),
                expected: expected_version,
                found,
            });
        }
        let version = found.map_or(1, |v| v + 1);
        stats.insert(
            new_stats.agent_id.0.clone(),
            VersionedStats {
                stats: new_stats,
                version,
            },
        );
        Ok(version)
    }

    async fn list_stats(&self) -> StorageResult<Vec<AgentStats>> {
        let stats = self.stats.lock().unwrap();
        Ok(stats.values().map(|v| v.stats.clone()).collect())
    }

    async fn assign_ranks(&self, ranks: &[(AgentId, u32)]) -> StorageResult<()> {
        let mut stats = self.stats.lock().unwrap();
        for (agent_id, rank) in ranks {
            if let Some(entry) = stats.get_mut(agent_id.as_str()) {
                entry.stats.rank = Some(*rank);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryBattleLedger
// ---------------------------------------------------------------------------

/// In-memory battle ledger backed by a `HashMap<battle_id, BattleRecord>`.
#[derive(Debug, Default)]
pub struct MemoryBattleLedger {
    battles: Mutex<HashMap<String, BattleRecord>>,
}

impl MemoryBattleLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BattleLedger for MemoryBattleLedger {
    async fn record_battle(&self, record: &BattleRecord) -> StorageResult<()> {
        let mut battles = self.battles.lock().unwrap();
        if battles.contains_key(record.battle_id.as_str()) {
            return Err(StorageError::DuplicateBattle {
                battle_id: record.battle_id.0.clone(),
            });
        }
        battles.insert(record.battle_id.0.clone(), record.clone());
        Ok(())
    }

    async fn get_battle(&self, battle_id: &BattleId) -> StorageResult<BattleRecord> {
        let battles = self.battles.lock().unwrap();
        battles
            .get(battle_id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::BattleNotFound {
                battle_id: battle_id.0.clone(),
            })
    }

    async fn list_battles(&self, agent: Option<&AgentId>) -> StorageResult<Vec<BattleRecord>> {
        let battles = self.battles.lock().unwrap();
        let mut records: Vec<BattleRecord> = battles
            .values()
            .filter(|b| {
                agent
                    .map(|a| b.agent_a == *a || b.agent_b == *a)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// MemorySettlementLedger
// ---------------------------------------------------------------------------

/// In-memory settlement outbox backed by a `HashMap<battle_id, SettlementRecord>`.
#[derive(Debug, Default)]
pub struct MemorySettlementLedger {
    settlements: Mutex<HashMap<String, SettlementRecord>>,
}

impl MemorySettlementLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettlementLedger for MemorySettlementLedger {
    async fn enqueue(&self, record: SettlementRecord) -> StorageResult<bool> {
        let mut settlements = self.settlements.lock().unwrap();
        if settlements.contains_key(record.battle_id.as_str()) {
            return Ok(false);
        }
        settlements.insert(record.battle_id.0.clone(), record);
        Ok(true)
    }

    async fn claim(&self, battle_id: &BattleId) -> StorageResult<Option<SettlementRecord>> {
        let mut settlements = self.settlements.lock().unwrap();
        let record = settlements
            .get_mut(battle_id.as_str())
            .ok_or_else(|| StorageError::SettlementNotFound {
                battle_id: battle_id.0.clone(),
            })?;
        if record.status != SettlementStatus::Pending {
            return Ok(None);
        }
        record.status = SettlementStatus::InFlight;
        Ok(Some(record.clone()))
    }

    async fn complete(
        &self,
        battle_id: &BattleId,
        resolution: SettlementResolution,
    ) -> StorageResult<SettlementRecord> {
        let mut settlements = self.settlements.lock().unwrap();
        let record = settlements
            .get_mut(battle_id.as_str())
            .ok_or_else(|| StorageError::SettlementNotFound {
                battle_id: battle_id.0.clone(),
            })?;
        if record.status != SettlementStatus::InFlight {
            return Err(StorageError::InvalidSettlementState {
                battle_id: battle_id.0.clone(),
                status: record.status.to_string(),
                expected: SettlementStatus::InFlight.to_string(),
            });
        }
        *record = record.clone().resolve(resolution);
        Ok(record.clone())
    }

    async fn get_settlement(
        &self,
        battle_id: &BattleId,
    ) -> StorageResult<Option<SettlementRecord>> {
        let settlements = self.settlements.lock().unwrap();
        Ok(settlements.get(battle_id.as_str()).cloned())
    }

    async fn pending_settlements(&self) -> StorageResult<Vec<SettlementRecord>> {
        let settlements = self.settlements.lock().unwrap();
        let mut pending: Vec<SettlementRecord> = settlements
            .values()
            .filter(|s| s.status == SettlementStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }
}
