//! An outstanding claim on a signer's next nonce.

use std::sync::Arc;

use maker_store::{NonceRecord, NonceStore};
use maker_types::{Address, ChainId, Clock};
use tokio::sync::OwnedMutexGuard;

use crate::NonceError;

/// Holds the signer's mutex until resolved.
///
/// Resolve with exactly one of [`submit`](Self::submit) or
/// [`rollback`](Self::rollback). Dropping an unresolved lease releases the
/// mutex without touching the persisted value.
pub struct NonceLease {
    nonce: u64,
    chain: ChainId,
    signer: Address,
    store: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    resolved: bool,
    _guard: OwnedMutexGuard<()>,
}

impl NonceLease {
    pub(crate) fn new(
        nonce: u64,
        chain: ChainId,
        signer: Address,
        store: Arc<dyn NonceStore>,
        clock: Arc<dyn Clock>,
        guard: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            nonce,
            chain,
            signer,
            store,
            clock,
            resolved: false,
            _guard: guard,
        }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn signer(&self) -> &Address {
        &self.signer
    }

    /// The leased nonce was used: persist `nonce + 1` and release.
    pub fn submit(mut self) -> Result<(), NonceError> {
        self.resolved = true;
        let record = NonceRecord {
            nonce: self.nonce + 1,
            last_usage: self.clock.now(),
        };
        self.store.put_nonce(&self.chain, &self.signer, &record)?;
        tracing::debug!(chain = %self.chain, signer = %self.signer, nonce = self.nonce, "nonce submitted");
        Ok(())
    }

    /// The leased nonce was not used: re-persist it unchanged and release.
    pub fn rollback(mut self) -> Result<(), NonceError> {
        self.resolved = true;
        let last_usage = self
            .store
            .get_nonce(&self.chain, &self.signer)?
            .map(|r| r.last_usage)
            .unwrap_or(self.clock.now());
        let record = NonceRecord {
            nonce: self.nonce,
            last_usage,
        };
        self.store.put_nonce(&self.chain, &self.signer, &record)?;
        tracing::debug!(chain = %self.chain, signer = %self.signer, nonce = self.nonce, "nonce rolled back");
        Ok(())
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!(
                chain = %self.chain,
                signer = %self.signer,
                nonce = self.nonce,
                "nonce lease dropped unresolved"
            );
        }
    }
}
