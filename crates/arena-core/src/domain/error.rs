//! Domain-level error taxonomy for the arena engine.

use arena_state::StorageError;

/// Arena domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("invalid rubric: {0}")]
    InvalidRubric(String),

    #[error("unknown battle format: {0}")]
    UnknownFormat(String),

    #[error("invalid battle format: {0}")]
    InvalidFormat(String),

    #[error("invalid battle request: {0}")]
    InvalidBattle(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("stats for agent {agent_id} still conflicting after {attempts} attempts")]
    RankingContention { agent_id: String, attempts: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for arena domain operations.
pub type Result<T> = std::result::Result<T, ArenaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_error_display() {
        let err = ArenaError::UnknownFormat("cypher".to_string());
        assert!(err.to_string().contains("unknown battle format"));
        assert!(err.to_string().contains("cypher"));

        let err = ArenaError::InvalidRubric("weights must be positive".to_string());
        assert!(err.to_string().contains("invalid rubric"));
    }

    #[test]
    fn test_storage_error_converts() {
        let err: ArenaError = StorageError::BattleNotFound {
            battle_id: "b-1".to_string(),
        }
        .into();
        assert!(matches!(err, ArenaError::Storage(_)));
        assert!(err.to_string().contains("b-1"));
    }
}
