use anyhow::{Context, Result};
use arena_state::{BattleId, SettlementRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::outcome::{BattleOutcome, SideSummary};
use crate::domain::round::RoundWinner;
use crate::engine::BattleReport;
use crate::ranking::Standing;

pub const BATTLE_ARTIFACT_SCHEMA: &str = "1.0";

/// Persisted battle artifact (battle.json).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BattleArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub battle_id: BattleId,
    pub outcome_digest: String,
    pub outcome: BattleOutcome,
    pub settlement: Option<SettlementRecord>,
}

impl BattleArtifact {
    pub fn from_report(report: &BattleReport) -> Self {
        Self {
            schema_version: BATTLE_ARTIFACT_SCHEMA.to_string(),
            generated_at: Utc::now(),
            battle_id: report.battle_id.clone(),
            outcome_digest: report.outcome_digest.clone(),
            outcome: report.outcome.clone(),
            settlement: report.settlement.clone(),
        }
    }
}

/// Write battle.json in pretty JSON format.
pub fn write_battle_json(path: &Path, artifact: &BattleArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize battle artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn side_line(side: &SideSummary) -> String {
    format!(
        "| {} | {:.2} | {} | {} | {} |\n",
        side.agent_id, side.avg_score, side.rounds_won, side.kill_offs, side.narrative_improvements
    )
}

/// Render a feed-post style markdown summary of a battle outcome.
pub fn render_outcome_md(outcome: &BattleOutcome) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# {} vs {}\n\n",
        outcome.agent_a.agent_id, outcome.agent_b.agent_id
    ));
    out.push_str(&format!("- format: `{}`\n", outcome.format_id));
    match outcome.winner_id() {
        Some(winner) => out.push_str(&format!(
            "- winner: **{}** by {:.2}\n\n",
            winner, outcome.win_margin
        )),
        None => out.push_str("- result: **tie**\n\n"),
    }

    out.push_str("| agent | avg | rounds won | kill-offs | improvements |\n");
    out.push_str("|---|---|---|---|---|\n");
    out.push_str(&side_line(&outcome.agent_a));
    out.push_str(&side_line(&outcome.agent_b));
    out.push('\n');

    out.push_str("## Rounds\n");
    for pair in &outcome.rounds {
        let call = match pair.winner {
            RoundWinner::AgentA => outcome.agent_a.agent_id.to_string(),
            RoundWinner::AgentB => outcome.agent_b.agent_id.to_string(),
            RoundWinner::Tie => "tie".to_string(),
        };
        let kill_off = |has: bool| if has { " (kill-off)" } else { "" };
        out.push_str(&format!(
            "- round {}: {:.1}{} vs {:.1}{} → {}\n",
            pair.round,
            pair.agent_a.total_score,
            kill_off(pair.agent_a.has_kill_off),
            pair.agent_b.total_score,
            kill_off(pair.agent_b.has_kill_off),
            call
        ));
    }
    out
}

/// Render the battle summary plus its settlement status.
pub fn render_battle_md(report: &BattleReport) -> String {
    let mut out = render_outcome_md(&report.outcome);
    out.push_str("\n## Settlement\n");
    match &report.settlement {
        None => out.push_str("- none\n"),
        Some(record) => {
            out.push_str(&format!(
                "- {} {} from {} to {}: {}\n",
                record.amount, record.token, record.loser_id, record.winner_id, record.status
            ));
            if let Some(hash) = &record.tx_hash {
                out.push_str(&format!("- tx: `{}`\n", hash));
            }
            if let Some(detail) = &record.detail {
                out.push_str(&format!("- detail: {}\n", detail));
            }
        }
    }
    out.push_str(&format!("\n_battle `{}`_\n", report.battle_id));
    out
}

/// Render the standings table.
pub fn render_standings_md(standings: &[Standing]) -> String {
    let mut out = String::new();
    out.push_str("| rank | agent | avg | W | L | T | win rate | kill-offs |\n");
    out.push_str("|---|---|---|---|---|---|---|---|\n");
    for s in standings {
        out.push_str(&format!(
            "| {} | {} | {:.2} | {} | {} | {} | {:.0}% | {} |\n",
            s.rank,
            s.agent_id,
            s.avg_score,
            s.wins,
            s.losses,
            s.ties,
            s.win_rate * 100.0,
            s.kill_offs
        ));
    }
    out
}

/// Write the markdown battle summary.
pub fn write_battle_md(path: &Path, report: &BattleReport) -> Result<()> {
    std::fs::write(path, render_battle_md(report)).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
