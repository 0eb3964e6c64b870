//! SurrealDB schema migrations and initialization
//!
//! Sets up the arena tables with the unique indexes the storage contracts
//! lean on (one stats row per agent, one battle per id, one settlement per
//! battle).

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all arena tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing arena SurrealDB schema");

    init_agent_stats_table(db).await?;
    init_battles_table(db).await?;
    init_settlements_table(db).await?;

    info!("arena schema initialization complete");
    Ok(())
}

/// Initialize `agent_stats` table
///
/// Schema:
/// ```text
/// TABLE agent_stats {
///   agent_id:       STRING (unique)
///   total_battles:  INT
///   wins:           INT
///   losses:         INT
///   ties:           INT
///   avg_score:      FLOAT
///   kill_offs:      INT
///   rank:           INT?
///   version:        INT (bumped on every counter write)
///   updated_at:     DATETIME
/// }
/// ```
///
/// `version` backs the compare-and-swap in `put_stats`; rank writes leave it alone.
async fn init_agent_stats_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agent_stats table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_stats SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_agent_id ON TABLE agent_stats COLUMNS agent_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_avg_score ON TABLE agent_stats COLUMNS avg_score;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ agent_stats table initialized");
    Ok(())
}

/// Initialize `battles` table
///
/// Battle records are immutable: updates and deletes are denied.
async fn init_battles_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing battles table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS battles SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_battle_id ON TABLE battles COLUMNS battle_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_a ON TABLE battles COLUMNS agent_a;
        DEFINE INDEX IF NOT EXISTS idx_agent_b ON TABLE battles COLUMNS agent_b;
        DEFINE INDEX IF NOT EXISTS idx_battle_created_at ON TABLE battles COLUMNS created_at;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ battles table initialized");
    Ok(())
}

/// Initialize `settlements` table (the settlement outbox)
///
/// Schema:
/// ```text
/// TABLE settlements {
///   battle_id:   STRING (unique, idempotency key)
///   winner_id:   STRING
///   loser_id:    STRING
///   token:       STRING (ip | usdc_krump | jab)
///   amount:      FLOAT
///   status:      STRING (pending | in_flight | success | skipped | error)
///   tx_hash:     STRING?
///   detail:      STRING?
///   created_at:  DATETIME
///   settled_at:  DATETIME?
/// }
/// ```
async fn init_settlements_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing settlements table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS settlements SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_settlement_battle_id ON TABLE settlements COLUMNS battle_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_settlement_status ON TABLE settlements COLUMNS status;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ settlements table initialized");
    Ok(())
}
