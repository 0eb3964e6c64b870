//! Settlement outbox: at most one payout call per battle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_core::settlement::fakes::ScriptedPayoutService;
use arena_core::{
    drain_pending, spawn_settlement_worker, BattleEvaluator, BattleOutcome, BattleRequest,
    FormatRegistry, HttpPayoutService, PayoutConfig, PayoutResult, PayoutService, RoundJudge,
    Rubric, SettlementCoordinator, SettlementMode, TextScorer, TransferRequest,
    SETTLEMENT_AMOUNT,
};
use arena_state::fakes::{MemoryAgentDirectory, MemorySettlementLedger};
use arena_state::{
    AgentDirectory, AgentId, AgentProfile, BattleId, PayoutToken, SettlementLedger,
    SettlementRecord, SettlementResolution, SettlementStatus, StorageError, StorageResult,
};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decisive(winner: &str, loser: &str) -> BattleOutcome {
    let scorer = TextScorer::new(Rubric::default_rubric(), Default::default()).expect("scorer");
    BattleEvaluator::new(RoundJudge::new(scorer), FormatRegistry::default())
        .evaluate(
            &BattleRequest::new("freestyle", winner, loser)
                .with_responses(["stomp jab buck crowd story"], [""]),
        )
        .expect("evaluate")
}

fn directory() -> Arc<MemoryAgentDirectory> {
    Arc::new(MemoryAgentDirectory::with_agents([
        AgentProfile::new("winner")
            .with_token(PayoutToken::Jab)
            .with_wallet("custody-w", "0xwinner"),
        AgentProfile::new("loser").with_wallet("custody-l", "0xloser"),
        AgentProfile::new("plain"),
    ]))
}

struct Harness {
    ledger: Arc<MemorySettlementLedger>,
    payout: Arc<ScriptedPayoutService>,
    coordinator: Arc<SettlementCoordinator>,
}

fn harness(mode: SettlementMode, payout: ScriptedPayoutService) -> Harness {
    harness_with(directory(), mode, payout)
}

fn harness_with(
    directory: Arc<dyn AgentDirectory>,
    mode: SettlementMode,
    payout: ScriptedPayoutService,
) -> Harness {
    let ledger = Arc::new(MemorySettlementLedger::new());
    let payout = Arc::new(payout);
    let coordinator = Arc::new(SettlementCoordinator::new(
        directory,
        ledger.clone(),
        payout.clone(),
        mode,
    ));
    Harness {
        ledger,
        payout,
        coordinator,
    }
}

/// Directory whose lookups always fail.
struct BrokenDirectory;

#[async_trait]
impl AgentDirectory for BrokenDirectory {
    async fn get_agent(&self, _agent_id: &AgentId) -> StorageResult<Option<AgentProfile>> {
        Err(StorageError::Backend("directory offline".to_string()))
    }
}

/// Ledger that loses the write recording a payout outcome.
struct LostCompletion(MemorySettlementLedger);

#[async_trait]
impl SettlementLedger for LostCompletion {
    async fn enqueue(&self, record: SettlementRecord) -> StorageResult<bool> {
        self.0.enqueue(record).await
    }

    async fn claim(&self, battle_id: &BattleId) -> StorageResult<Option<SettlementRecord>> {
        self.0.claim(battle_id).await
    }

    async fn complete(
        &self,
        _battle_id: &BattleId,
        _resolution: SettlementResolution,
    ) -> StorageResult<SettlementRecord> {
        Err(StorageError::Backend("write timed out".to_string()))
    }

    async fn get_settlement(
        &self,
        battle_id: &BattleId,
    ) -> StorageResult<Option<SettlementRecord>> {
        self.0.get_settlement(battle_id).await
    }

    async fn pending_settlements(&self) -> StorageResult<Vec<SettlementRecord>> {
        self.0.pending_settlements().await
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inline_mode_pays_once_during_battle() {
    let h = harness(SettlementMode::Inline, ScriptedPayoutService::succeeding());
    let id = BattleId::from("b-inline");

    let record = h
        .coordinator
        .on_battle(&id, &decisive("winner", "loser"))
        .await
        .expect("record");
    assert_eq!(record.status, SettlementStatus::Success);
    assert_eq!(record.tx_hash.as_deref(), Some("0xb-inline"));
    assert_eq!(h.payout.calls(), 1);

    let request = &h.payout.requests()[0];
    assert_eq!(request.battle_id, id);
    assert_eq!(request.token, PayoutToken::Jab);
    assert_eq!(request.amount, SETTLEMENT_AMOUNT);
    assert_eq!(request.from_wallet_ref.as_deref(), Some("custody-l"));
    assert_eq!(request.to_address.as_deref(), Some("0xwinner"));

    // Replaying the same battle is a no-op.
    let again = h
        .coordinator
        .on_battle(&id, &decisive("winner", "loser"))
        .await
        .expect("record");
    assert_eq!(again.status, SettlementStatus::Success);
    assert_eq!(h.payout.calls(), 1);
}

#[tokio::test]
async fn deferred_mode_waits_for_drain() {
    let h = harness(SettlementMode::Deferred, ScriptedPayoutService::succeeding());
    let id = BattleId::from("b-deferred");

    let record = h
        .coordinator
        .on_battle(&id, &decisive("winner", "loser"))
        .await
        .expect("record");
    assert_eq!(record.status, SettlementStatus::Pending);
    assert_eq!(h.payout.calls(), 0);

    let first = drain_pending(&h.coordinator, 4).await.expect("drain");
    assert_eq!(first.pending, 1);
    assert_eq!(first.succeeded, 1);

    let second = drain_pending(&h.coordinator, 4).await.expect("drain");
    assert_eq!(second.pending, 0);
    assert_eq!(second.dispatched(), 0);
    assert_eq!(h.payout.calls(), 1);

    let stored = h.ledger.get_settlement(&id).await.expect("get").expect("record");
    assert_eq!(stored.status, SettlementStatus::Success);
}

#[tokio::test]
async fn winner_without_preference_gets_default_token() {
    let h = harness(SettlementMode::Deferred, ScriptedPayoutService::succeeding());
    let record = h
        .coordinator
        .on_battle(&BattleId::from("b-default"), &decisive("plain", "winner"))
        .await
        .expect("record");
    assert_eq!(record.token, PayoutToken::Ip);
    assert_eq!(record.winner_id, AgentId::from("plain"));
}

#[tokio::test]
async fn tie_produces_no_record() {
    let h = harness(SettlementMode::Inline, ScriptedPayoutService::succeeding());
    let scorer = TextScorer::new(Rubric::default_rubric(), Default::default()).expect("scorer");
    let tie = BattleEvaluator::new(RoundJudge::new(scorer), FormatRegistry::default())
        .evaluate(
            &BattleRequest::new("freestyle", "winner", "loser").with_responses(["same"], ["same"]),
        )
        .expect("evaluate");
    let id = BattleId::from("b-tie");

    assert!(h.coordinator.on_battle(&id, &tie).await.is_none());
    assert!(h.ledger.get_settlement(&id).await.expect("get").is_none());
    assert_eq!(h.payout.calls(), 0);
}

#[tokio::test]
async fn failed_directory_lookup_skips_with_default_token() {
    let h = harness_with(
        Arc::new(BrokenDirectory),
        SettlementMode::Inline,
        ScriptedPayoutService::succeeding(),
    );
    let record = h
        .coordinator
        .on_battle(&BattleId::from("b-broken"), &decisive("winner", "loser"))
        .await
        .expect("record");
    assert_eq!(record.status, SettlementStatus::Skipped);
    assert_eq!(record.token, PayoutToken::Ip);
    assert!(record
        .detail
        .unwrap_or_default()
        .contains("directory offline"));
    assert_eq!(h.payout.calls(), 0);
}

#[tokio::test]
async fn lost_completion_reports_the_claimed_record() {
    let ledger = Arc::new(LostCompletion(MemorySettlementLedger::new()));
    let payout = Arc::new(ScriptedPayoutService::succeeding());
    let coordinator = SettlementCoordinator::new(
        directory(),
        ledger.clone(),
        payout.clone(),
        SettlementMode::Inline,
    );
    let id = BattleId::from("b-lost");

    let record = coordinator
        .on_battle(&id, &decisive("winner", "loser"))
        .await
        .expect("record");
    assert_eq!(record.status, SettlementStatus::InFlight);
    assert_eq!(payout.calls(), 1);

    // Claimed records are never dispatched again.
    let report = drain_pending(&coordinator, 4).await.expect("drain");
    assert_eq!(report.dispatched(), 0);
    assert_eq!(payout.calls(), 1);
}

#[tokio::test]
async fn payout_failure_is_terminal() {
    let h = harness(
        SettlementMode::Inline,
        ScriptedPayoutService::succeeding().then(PayoutResult::Error {
            error: "insufficient funds".to_string(),
        }),
    );
    let id = BattleId::from("b-fail");

    let record = h
        .coordinator
        .on_battle(&id, &decisive("winner", "loser"))
        .await
        .expect("record");
    assert_eq!(record.status, SettlementStatus::Error);
    assert_eq!(record.detail.as_deref(), Some("insufficient funds"));
    assert!(record.tx_hash.is_none());

    // Never retried by later drains.
    let report = drain_pending(&h.coordinator, 2).await.expect("drain");
    assert_eq!(report.pending, 0);
    assert!(h.coordinator.dispatch(&id).await.expect("dispatch").is_none());
    assert_eq!(h.payout.calls(), 1);
}

#[tokio::test]
async fn skipped_payout_is_recorded() {
    let h = harness(
        SettlementMode::Inline,
        ScriptedPayoutService::always(PayoutResult::Skipped {
            reason: "missing wallet for payout".to_string(),
        }),
    );
    let record = h
        .coordinator
        .on_battle(&BattleId::from("b-skip"), &decisive("winner", "loser"))
        .await
        .expect("record");
    assert_eq!(record.status, SettlementStatus::Skipped);
    assert_eq!(record.detail.as_deref(), Some("missing wallet for payout"));
}

// ---------------------------------------------------------------------------
// Concurrent drains
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_drains_pay_each_battle_once() {
    let h = harness(
        SettlementMode::Deferred,
        ScriptedPayoutService::succeeding().with_delay(Duration::from_millis(20)),
    );
    let outcome = decisive("winner", "loser");
    for _ in 0..10 {
        h.coordinator
            .on_battle(&BattleId::new(), &outcome)
            .await
            .expect("record");
    }

    let drains: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move { drain_pending(&coordinator, 3).await })
        })
        .collect();

    let mut dispatched = 0;
    for drain in drains {
        dispatched += drain.await.expect("join").expect("drain").dispatched();
    }

    assert_eq!(dispatched, 10);
    assert_eq!(h.payout.calls(), 10);
    let mut ids: Vec<BattleId> = h.payout.requests().into_iter().map(|r| r.battle_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn worker_drains_until_shutdown() {
    let h = harness(SettlementMode::Deferred, ScriptedPayoutService::succeeding());
    let id = BattleId::from("b-worker");
    h.coordinator
        .on_battle(&id, &decisive("winner", "loser"))
        .await
        .expect("record");

    let (tx, rx) = watch::channel(false);
    let worker = spawn_settlement_worker(
        Arc::clone(&h.coordinator),
        Duration::from_millis(10),
        2,
        rx,
    );

    let mut settled = false;
    for _ in 0..100 {
        let record = h.ledger.get_settlement(&id).await.expect("get").expect("record");
        if record.status == SettlementStatus::Success {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(settled);

    tx.send(true).expect("shutdown");
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker stops")
        .expect("join");
    assert_eq!(h.payout.calls(), 1);
}

// ---------------------------------------------------------------------------
// HTTP payout service
// ---------------------------------------------------------------------------

/// Serve `responses` one per connection and capture request bodies.
async fn payout_server(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&bodies);

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            captured.lock().unwrap().push(request);
            let reply = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/transfer"), bodies)
}

/// Read one HTTP request and return its body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).to_string();
            }
        }
    }
    String::new()
}

fn transfer() -> TransferRequest {
    TransferRequest {
        battle_id: BattleId::from("b-http"),
        from_wallet_ref: Some("custody-l".to_string()),
        to_address: Some("0xwinner".to_string()),
        token: PayoutToken::UsdcKrump,
        amount: SETTLEMENT_AMOUNT,
    }
}

#[tokio::test]
async fn http_success_returns_hash_and_sends_request() {
    let (url, bodies) = payout_server(vec![(200, r#"{"hash":"0xfeed"}"#)]).await;
    let service = HttpPayoutService::new(PayoutConfig::new(&url).with_token("secret"))
        .expect("client");

    assert_eq!(
        service.transfer(&transfer()).await,
        PayoutResult::Success {
            hash: "0xfeed".to_string()
        }
    );

    let body: serde_json::Value =
        serde_json::from_str(&bodies.lock().unwrap()[0]).expect("json body");
    assert_eq!(body["battle_id"], "b-http");
    assert_eq!(body["token"], "usdc_krump");
    assert_eq!(body["to_address"], "0xwinner");
}

#[tokio::test]
async fn http_non_success_status_is_an_error() {
    let (url, _) = payout_server(vec![(503, r#"{"error":"busy"}"#)]).await;
    let service = HttpPayoutService::new(PayoutConfig::new(&url)).expect("client");

    match service.transfer(&transfer()).await {
        PayoutResult::Error { error } => assert!(error.contains("503")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_skip_response_is_a_skip() {
    let (url, _) =
        payout_server(vec![(200, r#"{"skipped":true,"reason":"wallet frozen"}"#)]).await;
    let service = HttpPayoutService::new(PayoutConfig::new(&url)).expect("client");

    assert_eq!(
        service.transfer(&transfer()).await,
        PayoutResult::Skipped {
            reason: "wallet frozen".to_string()
        }
    );
}

#[tokio::test]
async fn http_unconfigured_service_skips() {
    let service = HttpPayoutService::new(PayoutConfig::disabled()).expect("client");
    assert!(!service.is_configured());
    assert!(matches!(
        service.transfer(&transfer()).await,
        PayoutResult::Skipped { .. }
    ));
}
