//! Storage trait definitions for the arena engine
//!
//! These traits define the collaborators the engine reads and writes:
//! - `AgentDirectory`: read-only agent lookup (existence, payout preference)
//! - `RankingStore`: per-agent running statistics with optimistic versioning
//! - `BattleLedger`: persisted battle records keyed by battle id
//! - `SettlementLedger`: settlement outbox, at most one settlement per battle
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a competing agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        AgentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a battle. Doubles as the settlement idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BattleId(pub String);

impl BattleId {
    /// Generate a new random BattleId
    pub fn new() -> Self {
        BattleId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BattleId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for BattleId {
    fn from(s: &str) -> Self {
        BattleId(s.to_string())
    }
}

impl std::fmt::Display for BattleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AgentDirectory — read-only agent lookup
// ---------------------------------------------------------------------------

/// Token an agent wants to be paid in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutToken {
    #[default]
    Ip,
    UsdcKrump,
    Jab,
}

impl PayoutToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutToken::Ip => "ip",
            PayoutToken::UsdcKrump => "usdc_krump",
            PayoutToken::Jab => "jab",
        }
    }
}

impl std::fmt::Display for PayoutToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutToken {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(PayoutToken::Ip),
            "usdc_krump" => Ok(PayoutToken::UsdcKrump),
            "jab" => Ok(PayoutToken::Jab),
            other => Err(StorageError::Serialization(format!(
                "unknown payout token: {other}"
            ))),
        }
    }
}

/// What the directory knows about an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Stored payout preference; `None` means the default token.
    #[serde(default)]
    pub payout_token: Option<PayoutToken>,
    /// Custody reference used to debit this agent when it loses.
    #[serde(default)]
    pub wallet_ref: Option<String>,
    /// On-chain address credited when this agent wins.
    #[serde(default)]
    pub wallet_address: Option<String>,
}

impl AgentProfile {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: AgentId::new(agent_id),
            display_name: None,
            payout_token: None,
            wallet_ref: None,
            wallet_address: None,
        }
    }

    pub fn with_token(mut self, token: PayoutToken) -> Self {
        self.payout_token = Some(token);
        self
    }

    pub fn with_wallet(mut self, wallet_ref: &str, wallet_address: &str) -> Self {
        self.wallet_ref = Some(wallet_ref.to_string());
        self.wallet_address = Some(wallet_address.to_string());
        self
    }

    /// Payout preference, falling back to [`PayoutToken::Ip`].
    pub fn preferred_token(&self) -> PayoutToken {
        self.payout_token.unwrap_or_default()
    }
}

/// Read-only agent lookup.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Look up an agent. `Ok(None)` when the agent does not exist.
    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<Option<AgentProfile>>;
}

// ---------------------------------------------------------------------------
// RankingStore — per-agent running statistics
// ---------------------------------------------------------------------------

/// Running statistics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent_id: AgentId,
    pub total_battles: u64,
    pub wins: u64,
    pub losses: u64,
    pub ties: u64,
    /// Exact online mean of per-battle average scores.
    pub avg_score: f64,
    pub kill_offs: u64,
    /// Global 1-based rank, descending by `avg_score`. `None` until ranked.
    pub rank: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

impl AgentStats {
    /// Fresh stats for an agent that has never battled.
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            total_battles: 0,
            wins: 0,
            losses: 0,
            ties: 0,
            avg_score: 0.0,
            kill_offs: 0,
            rank: None,
            updated_at: Utc::now(),
        }
    }

    /// `wins / total_battles`, or 0 before the first battle.
    pub fn win_rate(&self) -> f64 {
        if self.total_battles == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_battles as f64
        }
    }

    /// Reject stats that cannot have been produced by the aggregator.
    pub fn validate(&self) -> StorageResult<()> {
        let malformed = |reason: String| StorageError::MalformedStats {
            agent_id: self.agent_id.0.clone(),
            reason,
        };
        if self.wins + self.losses + self.ties != self.total_battles {
            return Err(malformed(format!(
                "wins {} + losses {} + ties {} != total {}",
                self.wins, self.losses, self.ties, self.total_battles
            )));
        }
        if !self.avg_score.is_finite() || !(0.0..=10.0).contains(&self.avg_score) {
            return Err(malformed(format!("avg_score {} out of range", self.avg_score)));
        }
        Ok(())
    }
}

/// Stats plus the version they were read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedStats {
    pub stats: AgentStats,
    pub version: u64,
}

/// Per-agent statistics store.
///
/// Guarantees:
/// - `put_stats` is a compare-and-swap on the agent's version: it succeeds only
///   if the stored version equals `expected_version` (`None` = no row yet) and
///   returns the new version. Otherwise it fails with `VersionConflict`.
/// - `assign_ranks` writes derived rank data and does not bump versions.
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Read an agent's stats and current version.
    async fn get_stats(&self, agent_id: &AgentId) -> StorageResult<Option<VersionedStats>>;

    /// Write stats if the stored version still equals `expected_version`.
    async fn put_stats(
        &self,
        stats: AgentStats,
        expected_version: Option<u64>,
    ) -> StorageResult<u64>;

    /// All stored stats, in no particular order.
    async fn list_stats(&self) -> StorageResult<Vec<AgentStats>>;

    /// Persist global ranks for the given agents.
    async fn assign_ranks(&self, ranks: &[(AgentId, u32)]) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// BattleLedger — persisted battle records
// ---------------------------------------------------------------------------

/// A finished battle as persisted for feeds and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub battle_id: BattleId,
    pub format_id: String,
    pub agent_a: AgentId,
    pub agent_b: AgentId,
    /// `None` on a tie.
    pub winner: Option<AgentId>,
    /// SHA-256 hex digest of the canonical outcome JSON.
    pub outcome_digest: String,
    /// Full battle outcome as JSON.
    pub outcome: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Battle record persistence.
///
/// Guarantees:
/// - A battle id is recorded at most once; a second `record_battle` with the
///   same id fails with `DuplicateBattle`.
/// - Records are immutable once written.
#[async_trait]
pub trait BattleLedger: Send + Sync {
    async fn record_battle(&self, record: &BattleRecord) -> StorageResult<()>;

    /// Returns `BattleNotFound` if absent.
    async fn get_battle(&self, battle_id: &BattleId) -> StorageResult<BattleRecord>;

    /// Battles newest first, optionally only those `agent` took part in.
    async fn list_battles(&self, agent: Option<&AgentId>) -> StorageResult<Vec<BattleRecord>>;
}

// ---------------------------------------------------------------------------
// SettlementLedger — settlement outbox
// ---------------------------------------------------------------------------

/// Lifecycle of a settlement: `Pending → InFlight → Success | Skipped | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    InFlight,
    Success,
    Skipped,
    Error,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::InFlight => "in_flight",
            SettlementStatus::Success => "success",
            SettlementStatus::Skipped => "skipped",
            SettlementStatus::Error => "error",
        }
    }

    /// Terminal states are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Success | SettlementStatus::Skipped | SettlementStatus::Error
        )
    }
}

impl FromStr for SettlementStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SettlementStatus::Pending),
            "in_flight" => Ok(SettlementStatus::InFlight),
            "success" => Ok(SettlementStatus::Success),
            "skipped" => Ok(SettlementStatus::Skipped),
            "error" => Ok(SettlementStatus::Error),
            other => Err(StorageError::Backend(format!(
                "unknown settlement status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a claimed settlement ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementResolution {
    Success { tx_hash: String },
    Skipped { reason: String },
    Error { error: String },
}

impl SettlementResolution {
    pub fn status(&self) -> SettlementStatus {
        match self {
            SettlementResolution::Success { .. } => SettlementStatus::Success,
            SettlementResolution::Skipped { .. } => SettlementStatus::Skipped,
            SettlementResolution::Error { .. } => SettlementStatus::Error,
        }
    }
}

/// One settlement per battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub battle_id: BattleId,
    pub winner_id: AgentId,
    pub loser_id: AgentId,
    pub token: PayoutToken,
    pub amount: f64,
    pub status: SettlementStatus,
    /// Written once on success, never overwritten.
    pub tx_hash: Option<String>,
    /// Skip reason or error message for non-success outcomes.
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl SettlementRecord {
    /// A new record waiting in the outbox.
    pub fn pending(
        battle_id: BattleId,
        winner_id: AgentId,
        loser_id: AgentId,
        token: PayoutToken,
        amount: f64,
    ) -> Self {
        Self {
            battle_id,
            winner_id,
            loser_id,
            token,
            amount,
            status: SettlementStatus::Pending,
            tx_hash: None,
            detail: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// A record that is terminal from the start (e.g. the winner is unknown).
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.status = SettlementStatus::Skipped;
        self.detail = Some(reason.into());
        self.settled_at = Some(Utc::now());
        self
    }

    /// Apply a resolution to an in-flight record.
    pub fn resolve(mut self, resolution: SettlementResolution) -> Self {
        self.status = resolution.status();
        match resolution {
            SettlementResolution::Success { tx_hash } => self.tx_hash = Some(tx_hash),
            SettlementResolution::Skipped { reason } => self.detail = Some(reason),
            SettlementResolution::Error { error } => self.detail = Some(error),
        }
        self.settled_at = Some(Utc::now());
        self
    }
}

/// Settlement outbox keyed by battle id.
///
/// Guarantees:
/// - `enqueue` is idempotent on the battle id: only the first call inserts
///   (returns `true`), later calls leave the stored record untouched.
/// - `claim` moves a record `Pending → InFlight` and returns it; exactly one
///   concurrent caller wins, every other caller gets `None`.
/// - `complete` moves `InFlight → terminal` once. A transaction hash is never
///   overwritten.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    /// Insert a settlement unless one already exists for the battle.
    async fn enqueue(&self, record: SettlementRecord) -> StorageResult<bool>;

    /// Claim a pending settlement for dispatch.
    async fn claim(&self, battle_id: &BattleId) -> StorageResult<Option<SettlementRecord>>;

    /// Record the terminal outcome of a claimed settlement.
    async fn complete(
        &self,
        battle_id: &BattleId,
        resolution: SettlementResolution,
    ) -> StorageResult<SettlementRecord>;

    async fn get_settlement(&self, battle_id: &BattleId)
        -> StorageResult<Option<SettlementRecord>>;

    /// Pending settlements, oldest first.
    async fn pending_settlements(&self) -> StorageResult<Vec<SettlementRecord>>;
}
