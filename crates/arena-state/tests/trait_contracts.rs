//! Trait contract tests for RankingStore, BattleLedger and SettlementLedger.
//!
//! Each contract is written once against the trait object and run against
//! both the in-memory fakes and the SurrealDB store (`mem://`). Any conforming
//! implementation must pass these.

use chrono::Utc;
use arena_state::fakes::{
    MemoryAgentDirectory, MemoryBattleLedger, MemoryRankingStore, MemorySettlementLedger,
};
use arena_state::storage_traits::*;
use arena_state::{StorageError, SurrealArenaStore};

async fn surreal() -> SurrealArenaStore {
    SurrealArenaStore::in_memory()
        .await
        .expect("in_memory() failed")
}

fn played(agent: &str, battles: u64, wins: u64, avg: f64) -> AgentStats {
    let mut stats = AgentStats::new(AgentId::from(agent));
    stats.total_battles = battles;
    stats.wins = wins;
    stats.losses = battles - wins;
    stats.avg_score = avg;
    stats
}

fn battle(id: &str, a: &str, b: &str) -> BattleRecord {
    BattleRecord {
        battle_id: BattleId::from(id),
        format_id: "debate".to_string(),
        agent_a: AgentId::from(a),
        agent_b: AgentId::from(b),
        winner: Some(AgentId::from(a)),
        outcome_digest: "0".repeat(64),
        outcome: serde_json::json!({"winner": a}),
        created_at: Utc::now(),
    }
}

fn pending(id: &str) -> SettlementRecord {
    SettlementRecord::pending(
        BattleId::from(id),
        AgentId::from("winner"),
        AgentId::from("loser"),
        PayoutToken::Jab,
        0.0001,
    )
}

// ===========================================================================
// AgentDirectory
// ===========================================================================

#[tokio::test]
async fn directory_returns_none_for_unknown_agent() {
    let dir = MemoryAgentDirectory::with_agents([AgentProfile::new("known")]);

    assert!(dir.get_agent(&AgentId::from("known")).await.unwrap().is_some());
    assert!(dir.get_agent(&AgentId::from("ghost")).await.unwrap().is_none());
}

// ===========================================================================
// RankingStore contracts
// ===========================================================================

async fn stats_create_then_cas(store: &dyn RankingStore) {
    let v1 = store.put_stats(played("a", 1, 1, 6.0), None).await.unwrap();
    assert_eq!(v1, 1);

    let read = store.get_stats(&AgentId::from("a")).await.unwrap().unwrap();
    assert_eq!(read.version, 1);
    assert_eq!(read.stats.wins, 1);

    let v2 = store
        .put_stats(played("a", 2, 2, 7.0), Some(read.version))
        .await
        .unwrap();
    assert_eq!(v2, 2);
    let read = store.get_stats(&AgentId::from("a")).await.unwrap().unwrap();
    assert_eq!(read.stats.total_battles, 2);
    assert_eq!(read.stats.avg_score, 7.0);
}

async fn stats_stale_version_conflicts(store: &dyn RankingStore) {
    store.put_stats(played("b", 1, 0, 3.0), None).await.unwrap();
    store.put_stats(played("b", 2, 1, 4.0), Some(1)).await.unwrap();

    let err = store
        .put_stats(played("b", 2, 0, 3.5), Some(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::VersionConflict {
            expected: Some(1),
            found: Some(2),
            ..
        }
    ));
}

async fn stats_double_create_conflicts(store: &dyn RankingStore) {
    store.put_stats(played("c", 1, 1, 5.0), None).await.unwrap();
    let err = store.put_stats(played("c", 1, 0, 2.0), None).await.unwrap_err();
    assert!(matches!(err, StorageError::VersionConflict { .. }));

    let read = store.get_stats(&AgentId::from("c")).await.unwrap().unwrap();
    assert_eq!(read.stats.wins, 1, "losing writer must not clobber the row");
}

async fn ranks_do_not_bump_version(store: &dyn RankingStore) {
    store.put_stats(played("d", 1, 1, 9.0), None).await.unwrap();
    store
        .assign_ranks(&[(AgentId::from("d"), 1), (AgentId::from("missing"), 2)])
        .await
        .unwrap();

    let read = store.get_stats(&AgentId::from("d")).await.unwrap().unwrap();
    assert_eq!(read.stats.rank, Some(1));
    assert_eq!(read.version, 1);
    assert_eq!(store.list_stats().await.unwrap().len(), 1);
}

#[tokio::test]
async fn memory_ranking_store_contracts() {
    stats_create_then_cas(&MemoryRankingStore::new()).await;
    stats_stale_version_conflicts(&MemoryRankingStore::new()).await;
    stats_double_create_conflicts(&MemoryRankingStore::new()).await;
    ranks_do_not_bump_version(&MemoryRankingStore::new()).await;
}

#[tokio::test]
async fn surreal_ranking_store_contracts() {
    stats_create_then_cas(&surreal().await).await;
    stats_stale_version_conflicts(&surreal().await).await;
    stats_double_create_conflicts(&surreal().await).await;
    ranks_do_not_bump_version(&surreal().await).await;
}

// ===========================================================================
// BattleLedger contracts
// ===========================================================================

async fn battle_record_and_fetch(ledger: &dyn BattleLedger) {
    ledger.record_battle(&battle("b-1", "x", "y")).await.unwrap();
    ledger.record_battle(&battle("b-2", "y", "z")).await.unwrap();

    let fetched = ledger.get_battle(&BattleId::from("b-1")).await.unwrap();
    assert_eq!(fetched.agent_a, AgentId::from("x"));
    assert_eq!(fetched.outcome["winner"], "x");

    assert_eq!(ledger.list_battles(None).await.unwrap().len(), 2);
    assert_eq!(
        ledger
            .list_battles(Some(&AgentId::from("z")))
            .await
            .unwrap()
            .len(),
        1
    );
}

async fn battle_duplicate_rejected(ledger: &dyn BattleLedger) {
    ledger.record_battle(&battle("dup", "x", "y")).await.unwrap();
    let err = ledger.record_battle(&battle("dup", "x", "y")).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateBattle { .. }));
}

async fn battle_not_found(ledger: &dyn BattleLedger) {
    let err = ledger.get_battle(&BattleId::from("nope")).await.unwrap_err();
    assert!(matches!(err, StorageError::BattleNotFound { .. }));
}

#[tokio::test]
async fn memory_battle_ledger_contracts() {
    battle_record_and_fetch(&MemoryBattleLedger::new()).await;
    battle_duplicate_rejected(&MemoryBattleLedger::new()).await;
    battle_not_found(&MemoryBattleLedger::new()).await;
}

#[tokio::test]
async fn surreal_battle_ledger_contracts() {
    battle_record_and_fetch(&surreal().await).await;
    battle_duplicate_rejected(&surreal().await).await;
    battle_not_found(&surreal().await).await;
}

// ===========================================================================
// SettlementLedger contracts
// ===========================================================================

async fn settlement_enqueue_is_idempotent(ledger: &dyn SettlementLedger) {
    assert!(ledger.enqueue(pending("s-1")).await.unwrap());
    assert!(!ledger.enqueue(pending("s-1")).await.unwrap());
    assert_eq!(ledger.pending_settlements().await.unwrap().len(), 1);
}

async fn settlement_claim_once(ledger: &dyn SettlementLedger) {
    ledger.enqueue(pending("s-2")).await.unwrap();

    let claimed = ledger.claim(&BattleId::from("s-2")).await.unwrap();
    assert_eq!(claimed.unwrap().status, SettlementStatus::InFlight);
    assert!(ledger.claim(&BattleId::from("s-2")).await.unwrap().is_none());
    assert!(ledger.pending_settlements().await.unwrap().is_empty());
}

async fn settlement_hash_written_once(ledger: &dyn SettlementLedger) {
    let id = BattleId::from("s-3");
    ledger.enqueue(pending("s-3")).await.unwrap();
    ledger.claim(&id).await.unwrap();

    let done = ledger
        .complete(
            &id,
            SettlementResolution::Success {
                tx_hash: "0xfeed".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, SettlementStatus::Success);
    assert_eq!(done.tx_hash.as_deref(), Some("0xfeed"));
    assert_eq!(done.token, PayoutToken::Jab);

    let err = ledger
        .complete(
            &id,
            SettlementResolution::Success {
                tx_hash: "0xother".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidSettlementState { .. }));

    let stored = ledger.get_settlement(&id).await.unwrap().unwrap();
    assert_eq!(stored.tx_hash.as_deref(), Some("0xfeed"));
}

async fn settlement_complete_requires_claim(ledger: &dyn SettlementLedger) {
    ledger.enqueue(pending("s-4")).await.unwrap();
    let err = ledger
        .complete(
            &BattleId::from("s-4"),
            SettlementResolution::Error {
                error: "rpc down".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidSettlementState { .. }));
}

async fn settlement_claim_unknown_battle(ledger: &dyn SettlementLedger) {
    let err = ledger.claim(&BattleId::from("ghost")).await.unwrap_err();
    assert!(matches!(err, StorageError::SettlementNotFound { .. }));
    assert!(ledger
        .get_settlement(&BattleId::from("ghost"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn memory_settlement_ledger_contracts() {
    settlement_enqueue_is_idempotent(&MemorySettlementLedger::new()).await;
    settlement_claim_once(&MemorySettlementLedger::new()).await;
    settlement_hash_written_once(&MemorySettlementLedger::new()).await;
    settlement_complete_requires_claim(&MemorySettlementLedger::new()).await;
    settlement_claim_unknown_battle(&MemorySettlementLedger::new()).await;
}

#[tokio::test]
async fn surreal_settlement_ledger_contracts() {
    settlement_enqueue_is_idempotent(&surreal().await).await;
    settlement_claim_once(&surreal().await).await;
    settlement_hash_written_once(&surreal().await).await;
    settlement_complete_requires_claim(&surreal().await).await;
    settlement_claim_unknown_battle(&surreal().await).await;
}

#[tokio::test]
async fn concurrent_claims_have_a_single_winner() {
    use std::sync::Arc;

    let ledger = Arc::new(MemorySettlementLedger::new());
    ledger.enqueue(pending("race")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.claim(&BattleId::from("race")).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
