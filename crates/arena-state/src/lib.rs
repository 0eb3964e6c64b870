//! Arena-State: storage layer for the battle engine
//!
//! This crate owns every piece of state the engine reads or writes outside a
//! single battle evaluation: agent lookups, running per-agent statistics,
//! battle records and the settlement outbox.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: versioned updates (no lost writes on agent stats) and at-most-once
//! settlement per battle.
//!
//! ## Key Components
//!
//! - `storage_traits`: backend-agnostic async traits and record types
//! - `fakes`: in-memory implementations for tests and the CLI
//! - `SurrealArenaStore`: SurrealDB implementation with schema migrations

mod error;
pub mod fakes;
pub mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::CloudConfig;
pub use storage_traits::{
    AgentDirectory, AgentId, AgentProfile, AgentStats, BattleId, BattleLedger, BattleRecord,
    PayoutToken, RankingStore, SettlementLedger, SettlementRecord, SettlementResolution,
    SettlementStatus, StorageResult, VersionedStats,
};
pub use surreal_store::SurrealArenaStore;

/// Result type for arena-state backend setup
pub type Result<T> = std::result::Result<T, StateError>;
