//! Payout service: the external collaborator that moves tokens.
//!
//! The engine never talks to wallets directly. It hands a
//! [`TransferRequest`] to a [`PayoutService`] and records whatever comes
//! back. Every failure is a [`PayoutResult`] value, never an `Err`.

use std::time::Duration;

use arena_state::{BattleId, PayoutToken, SettlementResolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::error::{ArenaError, Result};

/// One loser → winner transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Idempotency key passed through to the payout service.
    pub battle_id: BattleId,
    /// Custody reference of the paying (losing) agent.
    pub from_wallet_ref: Option<String>,
    /// Address of the receiving (winning) agent.
    pub to_address: Option<String>,
    pub token: PayoutToken,
    pub amount: f64,
}

/// What the payout service reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayoutResult {
    Success { hash: String },
    Skipped { reason: String },
    Error { error: String },
}

impl From<PayoutResult> for SettlementResolution {
    fn from(result: PayoutResult) -> Self {
        match result {
            PayoutResult::Success { hash } => SettlementResolution::Success { tx_hash: hash },
            PayoutResult::Skipped { reason } => SettlementResolution::Skipped { reason },
            PayoutResult::Error { error } => SettlementResolution::Error { error },
        }
    }
}

/// Performs token transfers. Timeouts and retries are the implementation's concern.
#[async_trait]
pub trait PayoutService: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> PayoutResult;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`HttpPayoutService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutConfig {
    /// Transfer endpoint. `None` disables payouts (every transfer is skipped).
    pub url: Option<String>,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        PayoutConfig {
            url: std::env::var("ARENA_PAYOUT_URL").ok().filter(|u| !u.is_empty()),
            token: std::env::var("ARENA_PAYOUT_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("ARENA_PAYOUT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}

impl PayoutConfig {
    /// Read `ARENA_PAYOUT_URL`, `ARENA_PAYOUT_TOKEN` and `ARENA_PAYOUT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for a specific endpoint.
    pub fn new(url: &str) -> Self {
        PayoutConfig {
            url: Some(url.to_string()),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// A config with payouts switched off.
    pub fn disabled() -> Self {
        PayoutConfig {
            url: None,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response body of the transfer endpoint:
/// `{"hash": ..}`, `{"skipped": true, "reason": ..}` or `{"error": ..}`.
#[derive(Debug, Deserialize)]
struct PayoutResponse {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    skipped: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl PayoutResponse {
    fn into_result(self) -> PayoutResult {
        if let Some(hash) = self.hash.filter(|h| !h.is_empty()) {
            PayoutResult::Success { hash }
        } else if self.skipped {
            PayoutResult::Skipped {
                reason: self
                    .reason
                    .unwrap_or_else(|| "skipped by payout service".to_string()),
            }
        } else if let Some(error) = self.error {
            PayoutResult::Error { error }
        } else {
            PayoutResult::Error {
                error: "payout service returned no hash".to_string(),
            }
        }
    }
}

/// Payout service reached over HTTP.
pub struct HttpPayoutService {
    config: PayoutConfig,
    http_client: reqwest::Client,
}

impl HttpPayoutService {
    pub fn new(config: PayoutConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("arena-core/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ArenaError::InvalidConfig(format!("payout http client: {e}")))?;

        Ok(HttpPayoutService {
            config,
            http_client,
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(PayoutConfig::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.config.url.is_some()
    }
}

#[async_trait]
impl PayoutService for HttpPayoutService {
    #[instrument(skip(self, request), fields(battle_id = %request.battle_id, token = %request.token))]
    async fn transfer(&self, request: &TransferRequest) -> PayoutResult {
        let Some(url) = self.config.url.as_deref() else {
            return PayoutResult::Skipped {
                reason: "payout service not configured".to_string(),
            };
        };
        if request.from_wallet_ref.is_none() || request.to_address.is_none() {
            return PayoutResult::Skipped {
                reason: "missing wallet for payout".to_string(),
            };
        }

        let mut builder = self.http_client.post(url).json(request);
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "payout request failed");
                return PayoutResult::Error {
                    error: format!("payout request failed: {e}"),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            return PayoutResult::Error {
                error: format!("payout service returned {status}"),
            };
        }

        match response.json::<PayoutResponse>().await {
            Ok(body) => {
                debug!("payout service responded");
                body.into_result()
            }
            Err(e) => PayoutResult::Error {
                error: format!("invalid payout response: {e}"),
            },
        }
    }
}
