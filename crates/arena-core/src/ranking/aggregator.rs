//! Folds finished battles into per-agent running statistics.
//!
//! Each participant is updated with an optimistic read-modify-write: read
//! the stats and their version, fold the battle in, and write back only if
//! the version is unchanged. A conflict re-reads and retries up to a fixed
//! number of attempts. A participant that cannot be updated is skipped with
//! a warning and never affects the other participant.

use std::collections::HashMap;
use std::sync::Arc;

use arena_state::{AgentDirectory, AgentId, AgentStats, RankingStore, StorageError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::error::{ArenaError, Result};
use crate::domain::outcome::{BattleOutcome, MatchResult};
use crate::metrics::METRICS;
use crate::obs::{emit_ranking_skipped, emit_ranking_updated};
use crate::ranking::index::{FullResortIndex, IndexStrategy, RankingIndex};
use crate::ranking::Standing;

/// Default number of compare-and-swap attempts per participant.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// What one battle contributes to one participant's stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub agent_id: AgentId,
    pub result: MatchResult,
    pub battle_avg: f64,
    pub kill_offs: u32,
}

/// Both participants' contributions, A first.
pub fn participant_results(outcome: &BattleOutcome) -> Vec<ParticipantResult> {
    outcome
        .sides()
        .into_iter()
        .map(|side| ParticipantResult {
            agent_id: side.agent_id.clone(),
            result: outcome.result_for(&side.agent_id).unwrap_or(MatchResult::Tie),
            battle_avg: side.avg_score,
            kill_offs: side.kill_offs,
        })
        .collect()
}

/// Fold one battle into existing stats. Rank is left for the next recompute.
pub fn fold_result(stats: &AgentStats, result: &ParticipantResult) -> AgentStats {
    let mut next = stats.clone();
    let previous = next.total_battles as f64;
    next.total_battles += 1;
    match result.result {
        MatchResult::Win => next.wins += 1,
        MatchResult::Loss => next.losses += 1,
        MatchResult::Tie => next.ties += 1,
    }
    next.avg_score = (stats.avg_score * previous + result.battle_avg) / (previous + 1.0);
    next.kill_offs += u64::from(result.kill_offs);
    next.updated_at = Utc::now();
    next
}

/// A participant whose stats were not updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedUpdate {
    pub agent_id: AgentId,
    pub reason: String,
}

/// Result of folding one battle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingUpdate {
    /// Updated stats, with ranks filled in when the recompute succeeded.
    pub updated: Vec<AgentStats>,
    pub skipped: Vec<SkippedUpdate>,
    /// Full recomputed ordering; empty if the recompute failed.
    pub standings: Vec<Standing>,
}

/// Applies battle outcomes to the ranking store and keeps global ranks current.
pub struct RankingAggregator {
    directory: Arc<dyn AgentDirectory>,
    store: Arc<dyn RankingStore>,
    index: Mutex<Box<dyn RankingIndex>>,
    max_attempts: u32,
}

impl RankingAggregator {
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        store: Arc<dyn RankingStore>,
        strategy: IndexStrategy,
        max_attempts: u32,
    ) -> Self {
        Self {
            directory,
            store,
            index: Mutex::new(strategy.build()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fold a battle into both participants and recompute global ranks.
    /// Never fails; problems are reported in the returned update.
    pub async fn apply(&self, outcome: &BattleOutcome) -> RankingUpdate {
        let mut update = RankingUpdate::default();

        for participant in participant_results(outcome) {
            match self.update_participant(&participant).await {
                Ok(stats) => update.updated.push(stats),
                Err(e) => {
                    METRICS.inc_ranking_skipped();
                    emit_ranking_skipped(participant.agent_id.as_str(), &e);
                    update.skipped.push(SkippedUpdate {
                        agent_id: participant.agent_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        match self.recompute_ranks().await {
            Ok(standings) => {
                for stats in &mut update.updated {
                    stats.rank = standings
                        .iter()
                        .find(|s| s.agent_id == stats.agent_id)
                        .map(|s| s.rank);
                }
                update.standings = standings;
            }
            Err(e) => warn!(error = %e, "rank recompute failed"),
        }

        update
    }

    /// Compare-and-swap loop for one participant.
    pub async fn update_participant(&self, participant: &ParticipantResult) -> Result<AgentStats> {
        let agent_id = &participant.agent_id;
        if self.directory.get_agent(agent_id).await?.is_none() {
            return Err(ArenaError::AgentNotFound(agent_id.to_string()));
        }

        for attempt in 1..=self.max_attempts {
            let (base, expected) = match self.store.get_stats(agent_id).await? {
                Some(current) => {
                    current.stats.validate()?;
                    (current.stats, Some(current.version))
                }
                None => (AgentStats::new(agent_id.clone()), None),
            };

            let next = fold_result(&base, participant);
            match self.store.put_stats(next.clone(), expected).await {
                Ok(version) => {
                    emit_ranking_updated(
                        agent_id.as_str(),
                        next.total_battles,
                        next.avg_score,
                        version,
                    );
                    return Ok(next);
                }
                Err(StorageError::VersionConflict { .. }) => {
                    METRICS.inc_ranking_conflicts();
                    debug!(agent_id = %agent_id, attempt, "stats version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ArenaError::RankingContention {
            agent_id: agent_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Sync the index with the store and persist ranks that changed.
    pub async fn recompute_ranks(&self) -> Result<Vec<Standing>> {
        // Held across the read and the write so recomputes never interleave.
        let mut index = self.index.lock().await;

        let all = self.store.list_stats().await?;
        for stats in &all {
            index.upsert(&stats.agent_id, stats.avg_score);
        }
        let ranking = index.ranking();

        let by_id: HashMap<&AgentId, &AgentStats> =
            all.iter().map(|s| (&s.agent_id, s)).collect();
        let changed: Vec<(AgentId, u32)> = ranking
            .iter()
            .filter(|(id, rank)| by_id.get(id).is_some_and(|s| s.rank != Some(*rank)))
            .cloned()
            .collect();
        if !changed.is_empty() {
            debug!(changed = changed.len(), "assigning ranks");
            self.store.assign_ranks(&changed).await?;
        }

        Ok(to_standings(&ranking, &by_id))
    }

    /// Current standings computed from the store, best first.
    pub async fn standings(&self) -> Result<Vec<Standing>> {
        standings(self.store.as_ref()).await
    }
}

/// Standings straight from a store, without touching persisted ranks.
pub async fn standings(store: &dyn RankingStore) -> Result<Vec<Standing>> {
    let all = store.list_stats().await?;
    let mut index = FullResortIndex::new();
    for stats in &all {
        index.upsert(&stats.agent_id, stats.avg_score);
    }
    let by_id: HashMap<&AgentId, &AgentStats> = all.iter().map(|s| (&s.agent_id, s)).collect();
    Ok(to_standings(&index.ranking(), &by_id))
}

fn to_standings(
    ranking: &[(AgentId, u32)],
    by_id: &HashMap<&AgentId, &AgentStats>,
) -> Vec<Standing> {
    ranking
        .iter()
        .filter_map(|(id, rank)| by_id.get(id).map(|s| Standing::from_stats(s, *rank)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_state::fakes::{MemoryAgentDirectory, MemoryRankingStore};
    use arena_state::AgentProfile;

    fn result(agent: &str, result: MatchResult, avg: f64, kill_offs: u32) -> ParticipantResult {
        ParticipantResult {
            agent_id: AgentId::from(agent),
            result,
            battle_avg: avg,
            kill_offs,
        }
    }

    #[test]
    fn fold_is_an_online_mean() {
        let fresh = AgentStats::new(AgentId::from("a"));
        let one = fold_result(&fresh, &result("a", MatchResult::Win, 6.0, 1));
        assert_eq!(one.total_battles, 1);
        assert_eq!(one.wins, 1);
        assert_eq!(one.avg_score, 6.0);
        assert_eq!(one.kill_offs, 1);

        let two = fold_result(&one, &result("a", MatchResult::Tie, 3.0, 0));
        assert_eq!(two.total_battles, 2);
        assert_eq!(two.ties, 1);
        assert!((two.avg_score - 4.5).abs() < 1e-12);
        assert_eq!(two.win_rate(), 0.5);
        two.validate().unwrap();
    }

    #[tokio::test]
    async fn unknown_agent_is_skipped() {
        let directory = Arc::new(MemoryAgentDirectory::with_agents([AgentProfile::new("a")]));
        let store = Arc::new(MemoryRankingStore::new());
        let aggregator =
            RankingAggregator::new(directory, store.clone(), IndexStrategy::Ordered, 3);

        let err = aggregator
            .update_participant(&result("ghost", MatchResult::Win, 5.0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::AgentNotFound(_)));
        assert!(store.list_stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_stats_are_not_overwritten() {
        let directory = Arc::new(MemoryAgentDirectory::with_agents([AgentProfile::new("a")]));
        let store = Arc::new(MemoryRankingStore::new());
        let mut broken = AgentStats::new(AgentId::from("a"));
        broken.total_battles = 3;
        store.put_stats(broken, None).await.unwrap();

        let aggregator = RankingAggregator::new(directory, store.clone(), IndexStrategy::Full, 3);
        let err = aggregator
            .update_participant(&result("a", MatchResult::Win, 5.0, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArenaError::Storage(StorageError::MalformedStats { .. })
        ));

        let stored = store.get_stats(&AgentId::from("a")).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn recompute_assigns_sequential_ranks() {
        let directory = Arc::new(MemoryAgentDirectory::new());
        let store = Arc::new(MemoryRankingStore::new());
        for (id, avg) in [("low", 2.0), ("high", 8.0), ("mid", 5.0)] {
            let mut stats = AgentStats::new(AgentId::from(id));
            stats.total_battles = 1;
            stats.wins = 1;
            stats.avg_score = avg;
            store.put_stats(stats, None).await.unwrap();
        }

        let aggregator = RankingAggregator::new(directory, store.clone(), IndexStrategy::Ordered, 3);
        let standings = aggregator.recompute_ranks().await.unwrap();
        let order: Vec<(&str, u32)> = standings
            .iter()
            .map(|s| (s.agent_id.as_str(), s.rank))
            .collect();
        assert_eq!(order, vec![("high", 1), ("mid", 2), ("low", 3)]);

        let low = store.get_stats(&AgentId::from("low")).await.unwrap().unwrap();
        assert_eq!(low.stats.rank, Some(3));
    }
}
