//! Post-battle token settlement.
//!
//! - `coordinator`: decides what to pay and owns the single payout call
//! - `payout`: the payout service seam and its HTTP client
//! - `worker`: drains the settlement outbox
//! - `fakes`: scripted payout service for tests

pub mod coordinator;
pub mod fakes;
pub mod payout;
pub mod worker;

pub use coordinator::{SettlementCoordinator, SettlementMode, SETTLEMENT_AMOUNT};
pub use payout::{HttpPayoutService, PayoutConfig, PayoutResult, PayoutService, TransferRequest};
pub use worker::{drain_pending, spawn_settlement_worker, DrainReport, DEFAULT_MAX_CONCURRENT};
