//! External deposit repository (the relational system of record).

use async_trait::async_trait;
use maker_types::{Address, ChainId, DepositStatus, Timestamp, TransferAmountTransaction};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Selects collectible deposits for one target chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositFilter {
    pub status: DepositStatus,
    pub target_chain: ChainId,
    /// Only deposits with `source_time` strictly after this instant.
    pub source_time_after: Timestamp,
    /// Restrict to these paying makers; empty means any.
    pub makers: Vec<Address>,
}

impl DepositFilter {
    pub fn matches(&self, tx: &TransferAmountTransaction) -> bool {
        tx.status == self.status
            && tx.target_chain == self.target_chain
            && tx.source_time > self.source_time_after
            && (self.makers.is_empty() || self.makers.contains(&tx.target_maker))
    }
}

/// Destination-side facts recorded once a payout was broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Destination tx hash (`hash#i` for members of a batch payout).
    pub target_id: String,
    pub target_symbol: String,
    /// Fee paid, in raw native units, when the account reported one.
    pub target_fee: Option<u128>,
}

/// Access to the persisted deposit records.
///
/// `update_status` is the optimistic-concurrency gate: it transitions only
/// the rows currently at `expected` and returns exactly those ids. At-most-once
/// claiming relies on nothing but that returned set.
#[async_trait]
pub trait DepositRepository: Send + Sync {
    async fn find_pending_deposits(
        &self,
        filter: &DepositFilter,
    ) -> Result<Vec<TransferAmountTransaction>, StoreError>;

    async fn find_deposit(
        &self,
        transaction_id: u64,
    ) -> Result<Option<TransferAmountTransaction>, StoreError>;

    /// Conditionally move `ids` from `expected` to `new`; returns the ids moved.
    async fn update_status(
        &self,
        ids: &[u64],
        expected: DepositStatus,
        new: DepositStatus,
    ) -> Result<Vec<u64>, StoreError>;

    /// Mark a processing deposit settled and attach its destination facts.
    async fn record_settlement(
        &self,
        transaction_id: u64,
        settlement: &SettlementRecord,
    ) -> Result<(), StoreError>;

    /// Whether any deposit already references `source_id` as settled.
    async fn settlement_exists(&self, source_id: &str) -> Result<bool, StoreError>;
}
