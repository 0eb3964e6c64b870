//! Global ordering of agents by average score.
//!
//! Both implementations produce the same ranking: descending `avg_score`,
//! ties broken by agent id ascending, ranks 1-based and sequential.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use arena_state::AgentId;
use serde::{Deserialize, Serialize};

use crate::domain::error::ArenaError;

/// Maintains the population ordering used for global ranks.
pub trait RankingIndex: Send + Sync {
    /// Insert an agent or move it to a new score.
    fn upsert(&mut self, agent_id: &AgentId, avg_score: f64);

    /// Full ordering as `(agent, rank)`, best first.
    fn ranking(&self) -> Vec<(AgentId, u32)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sort key: higher score first, then agent id.
#[derive(Debug, Clone)]
struct RankKey {
    avg_score: f64,
    agent_id: AgentId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .avg_score
            .total_cmp(&self.avg_score)
            .then_with(|| self.agent_id.cmp(&other.agent_id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

fn numbered<'a>(agents: impl Iterator<Item = &'a AgentId>) -> Vec<(AgentId, u32)> {
    agents
        .zip(1u32..)
        .map(|(id, rank)| (id.clone(), rank))
        .collect()
}

/// Re-sorts the whole population on every read.
#[derive(Debug, Default)]
pub struct FullResortIndex {
    scores: HashMap<AgentId, f64>,
}

impl FullResortIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RankingIndex for FullResortIndex {
    fn upsert(&mut self, agent_id: &AgentId, avg_score: f64) {
        self.scores.insert(agent_id.clone(), avg_score);
    }

    fn ranking(&self) -> Vec<(AgentId, u32)> {
        let mut keys: Vec<RankKey> = self
            .scores
            .iter()
            .map(|(id, score)| RankKey {
                avg_score: *score,
                agent_id: id.clone(),
            })
            .collect();
        keys.sort();
        numbered(keys.iter().map(|k| &k.agent_id))
    }

    fn len(&self) -> usize {
        self.scores.len()
    }
}

/// Keeps the population in an ordered set; an upsert moves one entry.
#[derive(Debug, Default)]
pub struct OrderedRankingIndex {
    scores: HashMap<AgentId, f64>,
    ordered: BTreeSet<RankKey>,
}

impl OrderedRankingIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RankingIndex for OrderedRankingIndex {
    fn upsert(&mut self, agent_id: &AgentId, avg_score: f64) {
        if let Some(old) = self.scores.insert(agent_id.clone(), avg_score) {
            if old.total_cmp(&avg_score) == Ordering::Equal {
                return;
            }
            self.ordered.remove(&RankKey {
                avg_score: old,
                agent_id: agent_id.clone(),
            });
        }
        self.ordered.insert(RankKey {
            avg_score,
            agent_id: agent_id.clone(),
        });
    }

    fn ranking(&self) -> Vec<(AgentId, u32)> {
        numbered(self.ordered.iter().map(|k| &k.agent_id))
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }
}

/// Which [`RankingIndex`] the aggregator keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    Full,
    #[default]
    Ordered,
}

impl IndexStrategy {
    pub fn build(self) -> Box<dyn RankingIndex> {
        match self {
            IndexStrategy::Full => Box::new(FullResortIndex::new()),
            IndexStrategy::Ordered => Box::new(OrderedRankingIndex::new()),
        }
    }
}

impl FromStr for IndexStrategy {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(IndexStrategy::Full),
            "ordered" => Ok(IndexStrategy::Ordered),
            other => Err(ArenaError::InvalidConfig(format!(
                "unknown rank index: {other}"
            ))),
        }
    }
}
