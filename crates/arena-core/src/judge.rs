//! Round judge: scores both sides of a round and calls the winner.

use crate::domain::round::{RoundPair, RoundWinner};
use crate::scoring::TextScorer;

/// Score gap below which a round is a tie.
pub const TIE_THRESHOLD: f64 = 0.5;

// Subtraction error allowed when a one-decimal gap of exactly 0.5 lands a
// few ulps below it, e.g. 4.6 - 4.1.
const GAP_ULPS: f64 = 8.0;

/// Whether two round scores are too close to call: `|a - b| < 0.5`.
pub fn is_tie(a: f64, b: f64) -> bool {
    let slack = f64::EPSILON * GAP_ULPS * a.abs().max(b.abs()).max(1.0);
    (a - b).abs() < TIE_THRESHOLD - slack
}

/// Runs the scorer for both sides of a round.
#[derive(Debug)]
pub struct RoundJudge {
    scorer: TextScorer,
}

impl RoundJudge {
    pub fn new(scorer: TextScorer) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &TextScorer {
        &self.scorer
    }

    /// Judge one 1-based round.
    pub fn judge(&self, round: u32, total_rounds: u32, text_a: &str, text_b: &str) -> RoundPair {
        let agent_a = self.scorer.score(text_a, round, total_rounds);
        let agent_b = self.scorer.score(text_b, round, total_rounds);

        let (a, b) = (agent_a.total_score, agent_b.total_score);
        let winner = if is_tie(a, b) {
            RoundWinner::Tie
        } else if a > b {
            RoundWinner::AgentA
        } else {
            RoundWinner::AgentB
        };

        RoundPair {
            round: agent_a.round,
            margin: ((a - b).abs() * 10.0).round() / 10.0,
            agent_a,
            agent_b,
            winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rubric::Rubric;
    use crate::scoring::ProgressionPolicy;

    fn judge() -> RoundJudge {
        RoundJudge::new(
            TextScorer::new(Rubric::default_rubric(), ProgressionPolicy::Unconditional).unwrap(),
        )
    }

    #[test]
    fn tie_boundaries() {
        assert!(is_tie(5.0, 5.0));
        assert!(is_tie(5.0, 5.4999));
        assert!(is_tie(5.4999, 5.0));
        assert!(!is_tie(5.0, 5.5));
        assert!(!is_tie(7.3, 6.8));
        assert!(!is_tie(1.0, 1.5));
        assert!(!is_tie(4.1, 4.6));
        assert!(!is_tie(4.6, 4.1));
    }

    #[test]
    fn gaps_just_under_half_a_point_are_ties() {
        assert!(is_tie(0.0, 0.4999999995));
        assert!(is_tie(9.5, 9.999999));
        assert!(is_tie(10.0, 9.5000001));
    }

    #[test]
    fn identical_text_is_a_tie() {
        let pair = judge().judge(1, 3, "stomp and buck", "stomp and buck");
        assert_eq!(pair.winner, RoundWinner::Tie);
        assert_eq!(pair.margin, 0.0);
    }

    #[test]
    fn stronger_side_wins() {
        let pair = judge().judge(
            2,
            3,
            "",
            "stomp jab buck footwork rhythm, the crowd energy was raw",
        );
        assert_eq!(pair.winner, RoundWinner::AgentB);
        assert!(pair.agent_b.total_score > pair.agent_a.total_score);
        assert_eq!(pair.round, 2);
    }
}
