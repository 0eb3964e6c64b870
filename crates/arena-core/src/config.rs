//! Engine configuration.
//!
//! Defaults are usable as-is; [`EngineConfig::from_env`] overrides them from
//! `ARENA_*` environment variables and rejects values it cannot parse.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{ArenaError, Result};
use crate::ranking::{IndexStrategy, DEFAULT_MAX_ATTEMPTS};
use crate::scoring::{ProgressionPolicy, DEFAULT_PROGRESSION_MIN_WORDS};
use crate::settlement::{SettlementMode, DEFAULT_MAX_CONCURRENT};

const DEFAULT_WORKER_INTERVAL_SECS: u64 = 5;

/// Tunables for a [`crate::engine::BattleEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `ARENA_SETTLEMENT_MODE`: `inline` | `deferred`.
    pub settlement_mode: SettlementMode,
    /// `ARENA_RANKING_MAX_ATTEMPTS`: compare-and-swap attempts per participant.
    pub ranking_max_attempts: u32,
    /// `ARENA_PROGRESSION`: `unconditional` | `length_gated`
    /// (threshold from `ARENA_PROGRESSION_MIN_WORDS`).
    pub progression: ProgressionPolicy,
    /// `ARENA_RANK_INDEX`: `full` | `ordered`.
    pub rank_index: IndexStrategy,
    /// `ARENA_WORKER_INTERVAL_SECS`: outbox poll interval.
    pub worker_interval: Duration,
    /// `ARENA_MAX_CONCURRENT_PAYOUTS`: payout calls in flight per drain.
    pub max_concurrent_payouts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settlement_mode: SettlementMode::default(),
            ranking_max_attempts: DEFAULT_MAX_ATTEMPTS,
            progression: ProgressionPolicy::default(),
            rank_index: IndexStrategy::default(),
            worker_interval: Duration::from_secs(DEFAULT_WORKER_INTERVAL_SECS),
            max_concurrent_payouts: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `ARENA_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(mode) = get("ARENA_SETTLEMENT_MODE") {
            config.settlement_mode = mode.parse()?;
        }
        if let Some(attempts) = get("ARENA_RANKING_MAX_ATTEMPTS") {
            config.ranking_max_attempts = parse_number("ARENA_RANKING_MAX_ATTEMPTS", &attempts)?;
        }
        if let Some(policy) = get("ARENA_PROGRESSION") {
            config.progression = policy.parse()?;
        }
        if let ProgressionPolicy::LengthGated { min_words } = &mut config.progression {
            *min_words = match get("ARENA_PROGRESSION_MIN_WORDS") {
                Some(raw) => parse_number("ARENA_PROGRESSION_MIN_WORDS", &raw)?,
                None => DEFAULT_PROGRESSION_MIN_WORDS,
            };
        }
        if let Some(index) = get("ARENA_RANK_INDEX") {
            config.rank_index = index.parse()?;
        }
        if let Some(secs) = get("ARENA_WORKER_INTERVAL_SECS") {
            config.worker_interval =
                Duration::from_secs(parse_number("ARENA_WORKER_INTERVAL_SECS", &secs)?);
        }
        if let Some(n) = get("ARENA_MAX_CONCURRENT_PAYOUTS") {
            config.max_concurrent_payouts = parse_number("ARENA_MAX_CONCURRENT_PAYOUTS", &n)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_settlement_mode(mut self, mode: SettlementMode) -> Self {
        self.settlement_mode = mode;
        self
    }

    pub fn with_progression(mut self, progression: ProgressionPolicy) -> Self {
        self.progression = progression;
        self
    }

    pub fn with_rank_index(mut self, rank_index: IndexStrategy) -> Self {
        self.rank_index = rank_index;
        self
    }

    pub fn with_ranking_max_attempts(mut self, attempts: u32) -> Self {
        self.ranking_max_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranking_max_attempts == 0 {
            return Err(ArenaError::InvalidConfig(
                "ranking_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_payouts == 0 {
            return Err(ArenaError::InvalidConfig(
                "max_concurrent_payouts must be at least 1".to_string(),
            ));
        }
        if self.worker_interval.is_zero() {
            return Err(ArenaError::InvalidConfig(
                "worker_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ArenaError::InvalidConfig(format!("{key}: not a valid number: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.settlement_mode, SettlementMode::Deferred);
        assert_eq!(config.ranking_max_attempts, 5);
        assert_eq!(config.progression, ProgressionPolicy::Unconditional);
        assert_eq!(config.rank_index, IndexStrategy::Ordered);
        config.validate().unwrap();
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(
            EngineConfig::from_lookup(lookup(&[])).unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn overrides_from_environment() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ARENA_SETTLEMENT_MODE", "inline"),
            ("ARENA_RANKING_MAX_ATTEMPTS", "9"),
            ("ARENA_PROGRESSION", "length_gated"),
            ("ARENA_PROGRESSION_MIN_WORDS", "20"),
            ("ARENA_RANK_INDEX", "full"),
        ]))
        .unwrap();

        assert_eq!(config.settlement_mode, SettlementMode::Inline);
        assert_eq!(config.ranking_max_attempts, 9);
        assert_eq!(
            config.progression,
            ProgressionPolicy::LengthGated { min_words: 20 }
        );
        assert_eq!(config.rank_index, IndexStrategy::Full);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(EngineConfig::from_lookup(lookup(&[("ARENA_RANKING_MAX_ATTEMPTS", "many")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("ARENA_RANKING_MAX_ATTEMPTS", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("ARENA_SETTLEMENT_MODE", "later")])).is_err());
    }
}
