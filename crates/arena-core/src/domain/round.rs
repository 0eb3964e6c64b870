//! Per-round scoring results.

use serde::{Deserialize, Serialize};

/// Score of one response against one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    /// Integer score in `1..=10`.
    pub normalized_score: u8,
    /// Total marker occurrences.
    pub raw_match_count: u32,
    /// Markers that matched at least once, in rubric order.
    pub matched_markers: Vec<String>,
}

/// One side's scored response in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// 1-based round number.
    pub round: u32,
    pub total_rounds: u32,
    pub criteria: Vec<CriterionScore>,
    /// Weighted mean of criterion scores, before bonuses.
    pub weighted_score: f64,
    pub progression_bonus: f64,
    pub kill_off_bonus: f64,
    /// Final score before the 10-point cap, rounded to one decimal.
    pub uncapped_score: f64,
    /// Final score, rounded to one decimal and capped at 10.
    pub total_score: f64,
    pub word_count: usize,
    pub char_count: usize,
    pub has_kill_off: bool,
}

impl RoundResult {
    /// Score for a named criterion.
    pub fn criterion(&self, name: &str) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.criterion == name)
    }

    /// Whether the cap changed this round's score.
    pub fn was_capped(&self) -> bool {
        self.uncapped_score > self.total_score
    }
}

/// Who took a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundWinner {
    AgentA,
    AgentB,
    Tie,
}

/// Both sides of one round plus the judge's call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPair {
    pub round: u32,
    pub agent_a: RoundResult,
    pub agent_b: RoundResult,
    pub winner: RoundWinner,
    /// `|a − b|`, rounded to one decimal.
    pub margin: f64,
}
