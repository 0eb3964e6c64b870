//! Arena Core Library
//!
//! Battle evaluation and settlement engine: scores two-agent text battles
//! against a weighted rubric, folds outcomes into running standings and
//! settles a fixed token payout from loser to winner.

pub mod config;
pub mod domain;
pub mod engine;
pub mod evaluator;
pub mod judge;
pub mod metrics;
pub mod obs;
pub mod ranking;
pub mod reporting;
pub mod scoring;
pub mod settlement;
pub mod telemetry;

pub use config::EngineConfig;
pub use domain::{
    ArenaError, BattleFormat, BattleOutcome, BattleWinner, Criterion, CriterionScore,
    FormatRegistry, MatchResult, Result, RoundPair, RoundResult, RoundWinner, Rubric,
    SideSummary,
};
pub use engine::{BattleEngine, BattleReport, EngineStores};
pub use evaluator::{BattleEvaluator, BattleRequest};
pub use judge::{is_tie, RoundJudge, TIE_THRESHOLD};
pub use ranking::{
    IndexStrategy, RankingAggregator, RankingIndex, RankingUpdate, SkippedUpdate, Standing,
};
pub use reporting::{
    render_battle_md, render_outcome_md, render_standings_md, write_battle_json, write_battle_md,
    BattleArtifact,
};
pub use scoring::{normalize_score, ProgressionPolicy, TextScorer};
pub use settlement::{
    drain_pending, spawn_settlement_worker, DrainReport, HttpPayoutService, PayoutConfig,
    PayoutResult, PayoutService, SettlementCoordinator, SettlementMode, TransferRequest,
    SETTLEMENT_AMOUNT,
};

pub use metrics::METRICS;
pub use obs::{
    emit_battle_evaluated, emit_ranking_skipped, emit_ranking_updated, emit_settlement_enqueued,
    emit_settlement_finished, emit_settlement_skipped, BattleSpan,
};
pub use telemetry::init_tracing;

pub use arena_state::{AgentId, AgentProfile, AgentStats, BattleId, PayoutToken, SettlementRecord};

/// Arena version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
