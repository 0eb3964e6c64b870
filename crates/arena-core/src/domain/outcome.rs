//! Battle outcome: the immutable result of evaluating every round.

use arena_state::AgentId;
use serde::{Deserialize, Serialize};

use crate::domain::digest::compute_digest;
use crate::domain::error::Result;
use crate::domain::round::RoundPair;

/// Literal stored in place of an agent id when a battle is drawn.
pub const TIE: &str = "tie";

/// Overall battle winner. Serializes as the winning agent id or `"tie"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum BattleWinner {
    Agent(AgentId),
    Tie,
}

impl From<BattleWinner> for String {
    fn from(winner: BattleWinner) -> Self {
        match winner {
            BattleWinner::Agent(id) => id.0,
            BattleWinner::Tie => TIE.to_string(),
        }
    }
}

impl From<String> for BattleWinner {
    fn from(s: String) -> Self {
        if s == TIE {
            BattleWinner::Tie
        } else {
            BattleWinner::Agent(AgentId(s))
        }
    }
}

impl std::fmt::Display for BattleWinner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BattleWinner::Agent(id) => write!(f, "{id}"),
            BattleWinner::Tie => f.write_str(TIE),
        }
    }
}

/// How a battle ended for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Win,
    Loss,
    Tie,
}

/// Per-participant totals across all rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideSummary {
    pub agent_id: AgentId,
    pub total_score: f64,
    pub avg_score: f64,
    pub kill_offs: u32,
    pub narrative_improvements: u32,
    pub rounds_won: u32,
}

/// Result of a finished battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleOutcome {
    pub format_id: String,
    pub agent_a: SideSummary,
    pub agent_b: SideSummary,
    pub rounds: Vec<RoundPair>,
    pub winner: BattleWinner,
    /// `|avg_a − avg_b|`; exactly 0 on a tie.
    pub win_margin: f64,
}

impl BattleOutcome {
    pub fn is_tie(&self) -> bool {
        self.winner == BattleWinner::Tie
    }

    pub fn winner_id(&self) -> Option<&AgentId> {
        match &self.winner {
            BattleWinner::Agent(id) => Some(id),
            BattleWinner::Tie => None,
        }
    }

    /// The participant that is not the winner; `None` on a tie.
    pub fn loser_id(&self) -> Option<&AgentId> {
        let winner = self.winner_id()?;
        if *winner == self.agent_a.agent_id {
            Some(&self.agent_b.agent_id)
        } else {
            Some(&self.agent_a.agent_id)
        }
    }

    pub fn result_for(&self, agent_id: &AgentId) -> Option<MatchResult> {
        if *agent_id != self.agent_a.agent_id && *agent_id != self.agent_b.agent_id {
            return None;
        }
        Some(match self.winner_id() {
            None => MatchResult::Tie,
            Some(w) if w == agent_id => MatchResult::Win,
            Some(_) => MatchResult::Loss,
        })
    }

    /// Both participants, A first.
    pub fn sides(&self) -> [&SideSummary; 2] {
        [&self.agent_a, &self.agent_b]
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// SHA-256 hex digest of the canonical JSON form.
    pub fn digest(&self) -> Result<String> {
        compute_digest(&serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(id: &str, avg: f64) -> SideSummary {
        SideSummary {
            agent_id: AgentId::from(id),
            total_score: avg * 2.0,
            avg_score: avg,
            kill_offs: 0,
            narrative_improvements: 0,
            rounds_won: 0,
        }
    }

    fn outcome(winner: BattleWinner) -> BattleOutcome {
        BattleOutcome {
            format_id: "freestyle".to_string(),
            agent_a: side("krumpa", 6.0),
            agent_b: side("krumpb", 3.0),
            rounds: Vec::new(),
            winner,
            win_margin: 3.0,
        }
    }

    #[test]
    fn winner_serializes_as_id_or_tie() {
        let win = serde_json::to_value(BattleWinner::Agent(AgentId::from("krumpa"))).unwrap();
        assert_eq!(win, serde_json::json!("krumpa"));
        let tie = serde_json::to_value(BattleWinner::Tie).unwrap();
        assert_eq!(tie, serde_json::json!("tie"));

        let back: BattleWinner = serde_json::from_value(tie).unwrap();
        assert_eq!(back, BattleWinner::Tie);
    }

    #[test]
    fn loser_is_the_other_side() {
        let o = outcome(BattleWinner::Agent(AgentId::from("krumpb")));
        assert_eq!(o.loser_id(), Some(&AgentId::from("krumpa")));
        assert_eq!(
            o.result_for(&AgentId::from("krumpa")),
            Some(MatchResult::Loss)
        );
        assert_eq!(o.result_for(&AgentId::from("nobody")), None);
    }

    #[test]
    fn tie_has_no_loser() {
        let o = outcome(BattleWinner::Tie);
        assert!(o.is_tie());
        assert!(o.loser_id().is_none());
        assert_eq!(o.result_for(&AgentId::from("krumpb")), Some(MatchResult::Tie));
    }

    #[test]
    fn digest_is_stable_and_sensitive() {
        let a = outcome(BattleWinner::Agent(AgentId::from("krumpa")));
        let d1 = a.digest().unwrap();
        assert_eq!(d1.len(), 64);
        assert_eq!(d1, a.clone().digest().unwrap());

        let mut b = a.clone();
        b.win_margin = 2.9;
        assert_ne!(d1, b.digest().unwrap());
    }
}
