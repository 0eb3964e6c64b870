//! Running per-agent statistics and the global ranking.

pub mod aggregator;
pub mod index;

use arena_state::{AgentId, AgentStats};
use serde::{Deserialize, Serialize};

pub use aggregator::{
    fold_result, participant_results, standings, ParticipantResult, RankingAggregator,
    RankingUpdate, SkippedUpdate, DEFAULT_MAX_ATTEMPTS,
};
pub use index::{FullResortIndex, IndexStrategy, OrderedRankingIndex, RankingIndex};

/// One row of the standings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: u32,
    pub agent_id: AgentId,
    pub avg_score: f64,
    pub total_battles: u64,
    pub wins: u64,
    pub losses: u64,
    pub ties: u64,
    pub kill_offs: u64,
    pub win_rate: f64,
}

impl Standing {
    pub fn from_stats(stats: &AgentStats, rank: u32) -> Self {
        Self {
            rank,
            agent_id: stats.agent_id.clone(),
            avg_score: stats.avg_score,
            total_battles: stats.total_battles,
            wins: stats.wins,
            losses: stats.losses,
            ties: stats.ties,
            kill_offs: stats.kill_offs,
            win_rate: stats.win_rate(),
        }
    }
}
