//! Domain models for the arena engine.
//!
//! - `Rubric`/`Criterion`: immutable scoring configuration
//! - `BattleFormat`/`FormatRegistry`: round counts and prompts per format
//! - `RoundResult`/`RoundPair`: per-round scores
//! - `BattleOutcome`: the result of a whole battle

pub mod digest;
pub mod error;
pub mod format;
pub mod outcome;
pub mod round;
pub mod rubric;

pub use error::{ArenaError, Result};
pub use format::{BattleFormat, FormatRegistry};
pub use outcome::{BattleOutcome, BattleWinner, MatchResult, SideSummary, TIE};
pub use round::{CriterionScore, RoundPair, RoundResult, RoundWinner};
pub use rubric::{Criterion, Rubric, KILL_OFF_PHRASES, MAX_SCORE};
