//! Nullable deposit repository: the relational store, in memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use maker_store::{DepositFilter, DepositRepository, SettlementRecord, StoreError};
use maker_types::{DepositStatus, TransferAmountTransaction};

/// In-memory deposit records with the same conditional-update semantics as
/// the real store: `update_status` moves only rows currently at `expected`.
#[derive(Default)]
pub struct NullDepositRepository {
    deposits: Mutex<BTreeMap<u64, TransferAmountTransaction>>,
    settlements: Mutex<Vec<(u64, SettlementRecord)>>,
    fail_settlements: AtomicBool,
}

impl NullDepositRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx: TransferAmountTransaction) {
        self.deposits.lock().unwrap().insert(tx.transaction_id, tx);
    }

    pub fn get(&self, transaction_id: u64) -> Option<TransferAmountTransaction> {
        self.deposits.lock().unwrap().get(&transaction_id).cloned()
    }

    pub fn status(&self, transaction_id: u64) -> Option<DepositStatus> {
        self.get(transaction_id).map(|tx| tx.status)
    }

    /// Overwrite a status unconditionally, as another writer would.
    pub fn set_status(&self, transaction_id: u64, status: DepositStatus) {
        if let Some(tx) = self.deposits.lock().unwrap().get_mut(&transaction_id) {
            tx.status = status;
        }
    }

    /// Every settlement recorded so far, in call order.
    pub fn settlements(&self) -> Vec<(u64, SettlementRecord)> {
        self.settlements.lock().unwrap().clone()
    }

    /// Make `record_settlement` fail until switched back.
    pub fn fail_settlement_writes(&self, fail: bool) {
        self.fail_settlements.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DepositRepository for NullDepositRepository {
    async fn find_pending_deposits(
        &self,
        filter: &DepositFilter,
    ) -> Result<Vec<TransferAmountTransaction>, StoreError> {
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .values()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect())
    }

    async fn find_deposit(
        &self,
        transaction_id: u64,
    ) -> Result<Option<TransferAmountTransaction>, StoreError> {
        Ok(self.get(transaction_id))
    }

    async fn update_status(
        &self,
        ids: &[u64],
        expected: DepositStatus,
        new: DepositStatus,
    ) -> Result<Vec<u64>, StoreError> {
        let mut deposits = self.deposits.lock().unwrap();
        let mut moved = Vec::new();
        for id in ids {
            if let Some(tx) = deposits.get_mut(id) {
                if tx.status == expected && expected.can_transition_to(new) {
                    tx.status = new;
                    moved.push(*id);
                }
            }
        }
        Ok(moved)
    }

    async fn record_settlement(
        &self,
        transaction_id: u64,
        settlement: &SettlementRecord,
    ) -> Result<(), StoreError> {
        if self.fail_settlements.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("settlement writes disabled".into()));
        }
        let mut deposits = self.deposits.lock().unwrap();
        let tx = deposits
            .get_mut(&transaction_id)
            .ok_or_else(|| StoreError::NotFound(format!("deposit {transaction_id}")))?;
        if !tx.status.can_transition_to(DepositStatus::Settled) {
            return Err(StoreError::Backend(format!(
                "deposit {transaction_id} is {:?}, cannot settle",
                tx.status
            )));
        }
        tx.status = DepositStatus::Settled;
        tx.target_id = Some(settlement.target_id.clone());
        self.settlements
            .lock()
            .unwrap()
            .push((transaction_id, settlement.clone()));
        Ok(())
    }

    async fn settlement_exists(&self, source_id: &str) -> Result<bool, StoreError> {
        Ok(self.deposits.lock().unwrap().values().any(|tx| {
            tx.source_id.eq_ignore_ascii_case(source_id) && tx.status == DepositStatus::Settled
        }))
    }
}
