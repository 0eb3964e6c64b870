//! Error types for arena-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the SurrealDB backend.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// Every backend (in-memory fakes, SurrealDB) maps its failures onto these
/// variants so callers can match on them without knowing the backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Optimistic version check failed; the caller should re-read and retry.
    #[error("version conflict for agent {agent_id}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        agent_id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("battle not found: {battle_id}")]
    BattleNotFound { battle_id: String },

    #[error("battle already recorded: {battle_id}")]
    DuplicateBattle { battle_id: String },

    #[error("settlement not found for battle: {battle_id}")]
    SettlementNotFound { battle_id: String },

    /// The settlement is not in the state the transition requires.
    #[error("settlement for battle {battle_id} is {status}, expected {expected}")]
    InvalidSettlementState {
        battle_id: String,
        status: String,
        expected: String,
    },

    /// Stored stats failed validation (negative counters, non-finite mean).
    #[error("malformed stats for agent {agent_id}: {reason}")]
    MalformedStats { agent_id: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_mentions_both_versions() {
        let err = StorageError::VersionConflict {
            agent_id: "krumper".to_string(),
            expected: Some(3),
            found: Some(4),
        };
        let msg = err.to_string();
        assert!(msg.contains("krumper"));
        assert!(msg.contains('3'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn state_error_converts_to_backend() {
        let err: StorageError = StateError::Connection("refused".to_string()).into();
        assert!(matches!(err, StorageError::Backend(ref m) if m.contains("refused")));
    }
}
