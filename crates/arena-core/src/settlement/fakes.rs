//! Test doubles for the payout service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::settlement::payout::{PayoutResult, PayoutService, TransferRequest};

/// Returns scripted results in order, then repeats the fallback. Records every request.
pub struct ScriptedPayoutService {
    script: Mutex<VecDeque<PayoutResult>>,
    fallback: PayoutResult,
    requests: Mutex<Vec<TransferRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedPayoutService {
    /// Every call returns `result`.
    pub fn always(result: PayoutResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: result,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Every call succeeds with a hash derived from the battle id.
    pub fn succeeding() -> Self {
        Self::always(PayoutResult::Success {
            hash: String::new(),
        })
    }

    pub fn then(self, result: PayoutResult) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    /// Sleep before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PayoutService for ScriptedPayoutService {
    async fn transfer(&self, request: &TransferRequest) -> PayoutResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| self.fallback.clone()) {
            PayoutResult::Success { hash } if hash.is_empty() => PayoutResult::Success {
                hash: format!("0x{}", request.battle_id),
            },
            other => other,
        }
    }
}
