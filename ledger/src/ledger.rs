//! Per-chain pending-order index backed by the persisted serial log.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use maker_store::SerialStore;
use maker_types::{Address, ChainId, TransferAmountTransaction};
use tokio::sync::RwLock;

use crate::{LedgerError, WalletLocks};

/// Serial value written when a deposit is claimed, before its payout hash is known.
pub const CLAIM_MARKER: &str = "1";

/// Result of [`SettlementLedger::add_transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Already queued under its target token.
    Exists,
    /// A serial record exists: claimed or paid in this or an earlier process.
    AlreadySettled,
}

/// Queue depth for one target token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBacklog {
    pub token: Address,
    pub pending: usize,
}

/// Undo information for [`SettlementLedger::remove_transactions_and_set_serial`].
///
/// Pass back to [`SettlementLedger::compensate`] when the claimed orders must
/// return to the queue.
#[must_use = "a claim that is neither settled nor compensated leaves orders out of the queue"]
#[derive(Debug)]
pub struct Compensation {
    token: Address,
    source_ids: Vec<String>,
    removed: Vec<TransferAmountTransaction>,
}

impl Compensation {
    pub fn source_ids(&self) -> &[String] {
        &self.source_ids
    }

    pub fn token(&self) -> &Address {
        &self.token
    }

    /// Consume a claim whose payout went out; its entries stay dequeued.
    pub fn into_source_ids(self) -> Vec<String> {
        self.source_ids
    }
}

#[derive(Default)]
struct LedgerIndex {
    by_token: HashMap<Address, BTreeSet<String>>,
    transactions: HashMap<String, TransferAmountTransaction>,
}

impl LedgerIndex {
    fn insert(&mut self, tx: TransferAmountTransaction) {
        self.by_token
            .entry(tx.target_token.clone())
            .or_default()
            .insert(tx.source_id.clone());
        self.transactions.insert(tx.source_id.clone(), tx);
    }

    fn remove(&mut self, token: &Address, id: &str) -> Option<TransferAmountTransaction> {
        if let Some(ids) = self.by_token.get_mut(token) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_token.remove(token);
            }
        }
        self.transactions.remove(id)
    }
}

/// Pending-order index and idempotency log for one target chain.
pub struct SettlementLedger {
    chain: ChainId,
    serials: Arc<dyn SerialStore>,
    index: RwLock<LedgerIndex>,
    wallet_locks: WalletLocks,
}

impl SettlementLedger {
    pub fn new(chain: ChainId, serials: Arc<dyn SerialStore>) -> Self {
        Self {
            chain,
            serials,
            index: RwLock::new(LedgerIndex::default()),
            wallet_locks: WalletLocks::new(),
        }
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }

    /// Queue a deposit unless it is already queued or already has a serial record.
    pub async fn add_transaction(
        &self,
        tx: TransferAmountTransaction,
    ) -> Result<AddOutcome, LedgerError> {
        let mut index = self.index.write().await;
        let queued = index
            .by_token
            .get(&tx.target_token)
            .is_some_and(|ids| ids.contains(&tx.source_id));
        if queued {
            tracing::debug!(chain = %self.chain, hash = %tx.source_id, "transaction exists");
            return Ok(AddOutcome::Exists);
        }
        if self.serials.get_serial(&self.chain, &tx.source_id)?.is_some() {
            tracing::info!(chain = %self.chain, hash = %tx.source_id, "payment already settled");
            return Ok(AddOutcome::AlreadySettled);
        }
        index.insert(tx);
        Ok(AddOutcome::Added)
    }

    pub async fn remove_transaction(
        &self,
        token: &Address,
        id: &str,
    ) -> Option<TransferAmountTransaction> {
        self.index.write().await.remove(token, id)
    }

    pub async fn remove_transactions(
        &self,
        token: &Address,
        ids: &[String],
    ) -> Vec<TransferAmountTransaction> {
        let mut index = self.index.write().await;
        ids.iter().filter_map(|id| index.remove(token, id)).collect()
    }

    /// Remove each id from the queue and write its claim marker.
    ///
    /// On any failure the entries removed so far are re-queued and the serial
    /// records written so far are deleted before the error is returned. This
    /// holds for in-process failures only: a crash between the in-memory
    /// removal and the serial write leaves the two out of step, and nothing
    /// here reconciles them on restart.
    pub async fn remove_transactions_and_set_serial(
        &self,
        token: &Address,
        ids: &[String],
    ) -> Result<Compensation, LedgerError> {
        let mut index = self.index.write().await;
        let mut removed = Vec::new();
        let mut written: Vec<String> = Vec::new();

        for id in ids {
            if let Some(tx) = index.remove(token, id) {
                removed.push(tx);
            }
            let entry = [(id.clone(), CLAIM_MARKER.to_string())];
            if let Err(e) = self.serials.put_serials(&self.chain, &entry) {
                tracing::warn!(chain = %self.chain, hash = %id, error = %e, "serial write failed, restoring claim");
                for tx in removed {
                    index.insert(tx);
                }
                if let Err(cleanup) = self.serials.delete_serials(&self.chain, &written) {
                    tracing::error!(chain = %self.chain, error = %cleanup, "failed to delete partial serial records");
                }
                return Err(e.into());
            }
            written.push(id.clone());
        }

        Ok(Compensation {
            token: token.clone(),
            source_ids: ids.to_vec(),
            removed,
        })
    }

    /// Undo a claim: re-queue the removed entries and delete their serial records.
    pub async fn compensate(&self, compensation: Compensation) -> Result<(), LedgerError> {
        let mut index = self.index.write().await;
        for tx in compensation.removed {
            index.insert(tx);
        }
        self.serials
            .delete_serials(&self.chain, &compensation.source_ids)
            .map_err(|e| LedgerError::Compensation {
                source_id: compensation.source_ids.join(","),
                reason: e.to_string(),
            })?;
        tracing::debug!(
            chain = %self.chain,
            token = %compensation.token,
            count = compensation.source_ids.len(),
            "claim compensated"
        );
        Ok(())
    }

    /// Overwrite claim markers with the payout outcome (destination tx hash).
    pub fn set_serial_outcome(&self, outcomes: &[(String, String)]) -> Result<(), LedgerError> {
        self.serials.put_serials(&self.chain, outcomes)?;
        Ok(())
    }

    pub fn serial_record(&self, source_id: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.serials.get_serial(&self.chain, source_id)?)
    }

    pub async fn get_transaction(&self, id: &str) -> Option<TransferAmountTransaction> {
        self.index.read().await.transactions.get(id).cloned()
    }

    pub async fn transactions_by_token(&self, token: &Address) -> Vec<TransferAmountTransaction> {
        let index = self.index.read().await;
        index
            .by_token
            .get(token)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| index.transactions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tokens with a non-empty queue and their depth, ordered by token.
    pub async fn symbols_with_data(&self) -> Vec<TokenBacklog> {
        let index = self.index.read().await;
        let ordered: BTreeMap<&Address, usize> = index
            .by_token
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(token, ids)| (token, ids.len()))
            .collect();
        ordered
            .into_iter()
            .map(|(token, pending)| TokenBacklog {
                token: token.clone(),
                pending,
            })
            .collect()
    }

    pub async fn pending_count(&self, token: &Address) -> usize {
        self.index
            .read()
            .await
            .by_token
            .get(token)
            .map_or(0, |ids| ids.len())
    }

    /// Serialize `fut` with every other exclusive section for `signer`.
    pub async fn run_exclusive<F, T>(&self, signer: &Address, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.wallet_locks.run_exclusive(signer, fut).await
    }
}
