//! Settlement ledger.
//!
//! One [`SettlementLedger`] per target chain tracks which deposits are
//! queued for payout (by target token) and guards against paying any of
//! them twice through the persisted serial log. The log only answers "was
//! this deposit claimed or paid already"; order status lives in the
//! external deposit repository.

pub mod error;
pub mod ledger;
pub mod wallet_lock;

pub use error::LedgerError;
pub use ledger::{AddOutcome, Compensation, SettlementLedger, TokenBacklog, CLAIM_MARKER};
pub use wallet_lock::WalletLocks;
