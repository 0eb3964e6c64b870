//! Battle evaluator: runs every round of a format and aggregates the outcome.

use std::cmp::Ordering;

use arena_state::AgentId;
use serde::{Deserialize, Serialize};

use crate::domain::error::{ArenaError, Result};
use crate::domain::format::{BattleFormat, FormatRegistry};
use crate::domain::outcome::{BattleOutcome, BattleWinner, SideSummary, TIE};
use crate::domain::round::{RoundPair, RoundResult, RoundWinner};
use crate::judge::RoundJudge;

/// Everything needed to evaluate one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRequest {
    pub format_id: String,
    pub agent_a: AgentId,
    pub agent_b: AgentId,
    #[serde(default)]
    pub responses_a: Vec<String>,
    #[serde(default)]
    pub responses_b: Vec<String>,
}

impl BattleRequest {
    pub fn new(format_id: &str, agent_a: &str, agent_b: &str) -> Self {
        Self {
            format_id: format_id.to_string(),
            agent_a: AgentId::from(agent_a),
            agent_b: AgentId::from(agent_b),
            responses_a: Vec::new(),
            responses_b: Vec::new(),
        }
    }

    pub fn with_responses<A, B>(mut self, responses_a: A, responses_b: B) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        self.responses_a = responses_a.into_iter().map(Into::into).collect();
        self.responses_b = responses_b.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<()> {
        for id in [&self.agent_a, &self.agent_b] {
            if id.as_str().trim().is_empty() {
                return Err(ArenaError::InvalidBattle("agent id must not be empty".to_string()));
            }
            if id.as_str() == TIE {
                return Err(ArenaError::InvalidBattle(format!(
                    "agent id {TIE:?} is reserved"
                )));
            }
        }
        if self.agent_a == self.agent_b {
            return Err(ArenaError::InvalidBattle(format!(
                "agent {} cannot battle itself",
                self.agent_a
            )));
        }
        Ok(())
    }
}

/// Orchestrates the rounds of a battle.
#[derive(Debug)]
pub struct BattleEvaluator {
    judge: RoundJudge,
    formats: FormatRegistry,
}

impl BattleEvaluator {
    pub fn new(judge: RoundJudge, formats: FormatRegistry) -> Self {
        Self { judge, formats }
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    pub fn judge(&self) -> &RoundJudge {
        &self.judge
    }

    /// Evaluate a request. Fails only on an unknown format or invalid participants.
    pub fn evaluate(&self, request: &BattleRequest) -> Result<BattleOutcome> {
        request.validate()?;
        let format = self.formats.get(&request.format_id)?;
        Ok(self.evaluate_rounds(
            format,
            &request.agent_a,
            &request.agent_b,
            &request.responses_a,
            &request.responses_b,
        ))
    }

    /// Run `max(len_a, len_b)` rounds; a missing response counts as empty text.
    ///
    /// With no responses on either side the format's round count is used so
    /// both sides still receive floor scores.
    pub fn evaluate_rounds(
        &self,
        format: &BattleFormat,
        agent_a: &AgentId,
        agent_b: &AgentId,
        responses_a: &[String],
        responses_b: &[String],
    ) -> BattleOutcome {
        let played = responses_a.len().max(responses_b.len());
        let round_count = if played == 0 {
            format.round_count as usize
        } else {
            played
        };

        let rounds: Vec<RoundPair> = (0..round_count)
            .map(|i| {
                let text_a = responses_a.get(i).map(String::as_str).unwrap_or("");
                let text_b = responses_b.get(i).map(String::as_str).unwrap_or("");
                self.judge
                    .judge(i as u32 + 1, format.round_count, text_a, text_b)
            })
            .collect();

        let (side_a, tenths_a) = summarize(agent_a, &rounds, |p| &p.agent_a, RoundWinner::AgentA);
        let (side_b, tenths_b) = summarize(agent_b, &rounds, |p| &p.agent_b, RoundWinner::AgentB);

        // Both sides play the same rounds, so comparing exact totals decides
        // the same way as comparing averages.
        let margin = tenths_as_avg((tenths_a - tenths_b).abs(), rounds.len());
        let (winner, win_margin) = match tenths_a.cmp(&tenths_b) {
            Ordering::Greater => (BattleWinner::Agent(agent_a.clone()), margin),
            Ordering::Less => (BattleWinner::Agent(agent_b.clone()), margin),
            Ordering::Equal => (BattleWinner::Tie, 0.0),
        };

        BattleOutcome {
            format_id: format.id.clone(),
            agent_a: side_a,
            agent_b: side_b,
            rounds,
            winner,
            win_margin,
        }
    }
}

/// Round scores carry one decimal; count them in whole tenths so sums are exact.
fn tenths(score: f64) -> i64 {
    (score * 10.0).round() as i64
}

fn tenths_as_avg(total_tenths: i64, rounds: usize) -> f64 {
    if rounds == 0 {
        0.0
    } else {
        total_tenths as f64 / (10 * rounds) as f64
    }
}

/// Summary of one side plus its exact total in tenths.
fn summarize(
    agent_id: &AgentId,
    rounds: &[RoundPair],
    side: impl Fn(&RoundPair) -> &RoundResult,
    wins_as: RoundWinner,
) -> (SideSummary, i64) {
    let scores: Vec<i64> = rounds.iter().map(|p| tenths(side(p).total_score)).collect();
    let total_tenths: i64 = scores.iter().sum();

    let summary = SideSummary {
        agent_id: agent_id.clone(),
        total_score: total_tenths as f64 / 10.0,
        avg_score: tenths_as_avg(total_tenths, scores.len()),
        kill_offs: rounds.iter().filter(|p| side(p).has_kill_off).count() as u32,
        narrative_improvements: scores.windows(2).filter(|w| w[1] > w[0]).count() as u32,
        rounds_won: rounds.iter().filter(|p| p.winner == wins_as).count() as u32,
    };
    (summary, total_tenths)
}
