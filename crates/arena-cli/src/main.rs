//! Arena - battle evaluation & settlement CLI
//!
//! The `arena` command scores two-agent text battles and keeps standings.
//!
//! ## Commands
//!
//! - `evaluate`: Score a battle file without recording anything
//! - `battle`: Score, record, rank and settle a battle
//! - `standings`: Show the standings table
//! - `settle-pending`: Dispatch every queued settlement once
//! - `rubric`: Print the scoring rubric
//! - `formats`: List battle formats

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use arena_core::{
    render_battle_md, render_outcome_md, render_standings_md, write_battle_json, write_battle_md,
    BattleArtifact, BattleEngine, BattleEvaluator, BattleOutcome, BattleReport, BattleRequest,
    EngineConfig, EngineStores, FormatRegistry, HttpPayoutService, RoundJudge, Rubric, TextScorer,
    METRICS,
};
use arena_state::fakes::MemoryAgentDirectory;
use arena_state::{AgentProfile, BattleId, SurrealArenaStore};

#[derive(Parser)]
#[command(name = "arena")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Battle evaluation & settlement engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a battle without recording it
    Evaluate {
        /// Battle request file (JSON)
        #[arg(short, long)]
        battle: PathBuf,

        /// Rubric file (JSON); the built-in rubric if omitted
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Write the outcome as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score, record, rank and settle a battle
    Battle {
        /// Battle request file (JSON)
        #[arg(short, long)]
        battle: PathBuf,

        /// Agent directory file (JSON array of profiles)
        #[arg(short, long, env = "ARENA_AGENTS_FILE")]
        agents: PathBuf,

        /// Battle id (a fresh UUID if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Rubric file (JSON); the built-in rubric if omitted
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Directory to write battle.json and battle.md into
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Keep all state in memory instead of SurrealDB
        #[arg(long)]
        in_memory: bool,
    },

    /// Show the standings table
    Standings,

    /// Dispatch every pending settlement once
    SettlePending {
        /// Agent directory file (JSON array of profiles)
        #[arg(short, long, env = "ARENA_AGENTS_FILE")]
        agents: PathBuf,
    },

    /// Print the scoring rubric as JSON
    Rubric {
        /// Rubric file to validate and print
        #[arg(long)]
        rubric: Option<PathBuf>,
    },

    /// List battle formats
    Formats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    arena_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Evaluate {
            battle,
            rubric,
            output,
        } => cmd_evaluate(&battle, rubric.as_deref(), output.as_deref()).map(|_| ()),
        Commands::Battle {
            battle,
            agents,
            id,
            rubric,
            out_dir,
            in_memory,
        } => {
            cmd_battle(
                &battle,
                &agents,
                id.as_deref(),
                rubric.as_deref(),
                out_dir.as_deref(),
                in_memory,
            )
            .await
        }
        Commands::Standings => cmd_standings().await,
        Commands::SettlePending { agents } => cmd_settle_pending(&agents).await,
        Commands::Rubric { rubric } => cmd_rubric(rubric.as_deref()),
        Commands::Formats => cmd_formats(),
    };

    METRICS.flush();
    result
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {what} {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {what} {:?}", path))
}

fn load_agents(path: &Path) -> Result<MemoryAgentDirectory> {
    let profiles: Vec<AgentProfile> = load_json(path, "agent directory")?;
    Ok(MemoryAgentDirectory::with_agents(profiles))
}

fn load_rubric(path: Option<&Path>) -> Result<Rubric> {
    match path {
        Some(path) => Rubric::load_json(path).with_context(|| format!("Invalid rubric {:?}", path)),
        None => Ok(Rubric::default_rubric()),
    }
}

async fn surreal_store() -> Result<SurrealArenaStore> {
    SurrealArenaStore::from_env()
        .await
        .context("Failed to connect to arena database")
}

async fn build_engine(
    agents: &Path,
    rubric: Option<&Path>,
    in_memory: bool,
) -> Result<BattleEngine> {
    let directory = Arc::new(load_agents(agents)?);
    let stores = if in_memory {
        EngineStores::in_memory(directory)
    } else {
        EngineStores::surreal(directory, surreal_store().await?)
    };
    let payout = HttpPayoutService::from_env().context("Failed to set up payout client")?;
    if !payout.is_configured() {
        info!("ARENA_PAYOUT_URL not set, settlements will be skipped");
    }

    let engine = BattleEngine::new(
        EngineConfig::from_env().context("Invalid ARENA_* configuration")?,
        load_rubric(rubric)?,
        FormatRegistry::default(),
        stores,
        Arc::new(payout),
    )?;
    Ok(engine)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Score a battle file and print the summary.
fn cmd_evaluate(
    battle: &Path,
    rubric: Option<&Path>,
    output: Option<&Path>,
) -> Result<BattleOutcome> {
    let request: BattleRequest = load_json(battle, "battle request")?;
    let scorer = TextScorer::new(load_rubric(rubric)?, EngineConfig::from_env()?.progression)?;
    let evaluator = BattleEvaluator::new(RoundJudge::new(scorer), FormatRegistry::default());
    let outcome = evaluator.evaluate(&request)?;

    print!("{}", render_outcome_md(&outcome));
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        println!("\nOutcome written to {:?}", path);
    }
    Ok(outcome)
}

/// Drain the outbox and refresh the report's settlement. The battle is
/// already recorded, so outbox failures are only logged.
async fn drain_before_exit(engine: &BattleEngine, report: &mut BattleReport) {
    if let Err(e) = engine.settle_pending().await {
        warn!(battle_id = %report.battle_id, error = %e, "settlement drain failed");
        return;
    }
    match engine.get_settlement(&report.battle_id).await {
        Ok(settlement) => report.settlement = settlement,
        Err(e) => warn!(battle_id = %report.battle_id, error = %e, "could not read settlement"),
    }
}

/// Run a battle end to end.
async fn run_battle(
    battle: &Path,
    agents: &Path,
    id: Option<&str>,
    rubric: Option<&Path>,
    out_dir: Option<&Path>,
    in_memory: bool,
) -> Result<BattleReport> {
    let request: BattleRequest = load_json(battle, "battle request")?;
    let engine = build_engine(agents, rubric, in_memory).await?;

    let battle_id = id.map(BattleId::from).unwrap_or_default();
    let mut report = engine
        .create_battle_with_id(battle_id, request)
        .await
        .context("Battle failed")?;

    // In-memory state dies with the process, so drain the outbox now.
    if in_memory && report.settlement.is_some() {
        drain_before_exit(&engine, &mut report).await;
    }

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        write_battle_json(&dir.join("battle.json"), &BattleArtifact::from_report(&report))?;
        write_battle_md(&dir.join("battle.md"), &report)?;
    }
    Ok(report)
}

async fn cmd_battle(
    battle: &Path,
    agents: &Path,
    id: Option<&str>,
    rubric: Option<&Path>,
    out_dir: Option<&Path>,
    in_memory: bool,
) -> Result<()> {
    let report = run_battle(battle, agents, id, rubric, out_dir, in_memory).await?;

    print!("{}", render_battle_md(&report));
    for skipped in &report.ranking.skipped {
        println!("! standings not updated for {}: {}", skipped.agent_id, skipped.reason);
    }
    if let Some(dir) = out_dir {
        println!("\nArtifacts written to {:?}", dir);
    }
    Ok(())
}

async fn cmd_standings() -> Result<()> {
    let store = surreal_store().await?;
    let standings = arena_core::ranking::standings(&store).await?;

    if standings.is_empty() {
        println!("No battles recorded yet");
        return Ok(());
    }
    print!("{}", render_standings_md(&standings));
    Ok(())
}

async fn cmd_settle_pending(agents: &Path) -> Result<()> {
    let engine = build_engine(agents, None, false).await?;
    let report = engine.settle_pending().await?;

    println!("Pending:         {}", report.pending);
    println!("Succeeded:       {}", report.succeeded);
    println!("Skipped:         {}", report.skipped);
    println!("Failed:          {}", report.failed);
    println!("Already claimed: {}", report.already_claimed);
    if report.errors > 0 {
        println!("Outbox errors:   {}", report.errors);
    }
    Ok(())
}

fn cmd_rubric(path: Option<&Path>) -> Result<()> {
    let rubric = load_rubric(path)?;
    println!("{}", serde_json::to_string_pretty(&rubric)?);
    Ok(())
}

fn cmd_formats() -> Result<()> {
    let registry = FormatRegistry::default();
    let mut formats: Vec<_> = registry.list().collect();
    formats.sort_by(|a, b| a.id.cmp(&b.id));

    for format in formats {
        println!("{:<14} {} round(s)  {}", format.id, format.round_count, format.name);
        for (i, prompt) in format.prompts.iter().enumerate() {
            println!("    {}. {}", i + 1, prompt);
        }
    }
    Ok(())
}
