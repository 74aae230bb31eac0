//! Account construction keyed by chain family, with a per-signer cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use maker_nonce::NonceLeaseStore;
use maker_types::{Address, ChainFamily, ChainId, ChainInfo, PrivateKey};

use crate::{Account, AccountError};

/// Everything a factory needs to build an account besides the key.
#[derive(Clone)]
pub struct AccountContext {
    pub chain: ChainInfo,
    pub signer: Address,
    /// Shared nonce registry; implementations lease through it.
    pub nonces: Arc<NonceLeaseStore>,
}

/// Builds connected accounts for one chain family.
#[async_trait]
pub trait AccountFactory: Send + Sync {
    fn family(&self) -> ChainFamily;

    async fn connect(
        &self,
        ctx: AccountContext,
        private_key: &PrivateKey,
    ) -> Result<Arc<dyn Account>, AccountError>;
}

/// Selects a factory by chain family and caches connected accounts.
pub struct AccountRegistry {
    factories: HashMap<ChainFamily, Arc<dyn AccountFactory>>,
    nonces: Arc<NonceLeaseStore>,
    cache: DashMap<(ChainId, Address), Arc<dyn Account>>,
}

impl AccountRegistry {
    pub fn new(nonces: Arc<NonceLeaseStore>) -> Self {
        Self {
            factories: HashMap::new(),
            nonces,
            cache: DashMap::new(),
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn AccountFactory>) -> Self {
        self.factories.insert(factory.family(), factory);
        self
    }

    pub fn nonces(&self) -> &Arc<NonceLeaseStore> {
        &self.nonces
    }

    /// The cached account for `(chain, signer)`, connecting on first use.
    pub async fn account(
        &self,
        chain: &ChainInfo,
        signer: &Address,
        private_key: &PrivateKey,
    ) -> Result<Arc<dyn Account>, AccountError> {
        let key = (chain.chain_id.clone(), signer.clone());
        if let Some(account) = self.cache.get(&key) {
            return Ok(Arc::clone(account.value()));
        }

        let factory = self
            .factories
            .get(&chain.family)
            .ok_or(AccountError::Unsupported(chain.family))?;
        let ctx = AccountContext {
            chain: chain.clone(),
            signer: signer.clone(),
            nonces: Arc::clone(&self.nonces),
        };
        let account = factory.connect(ctx, private_key).await?;
        tracing::info!(chain = %chain.chain_id, signer = %signer, family = ?chain.family, "account connected");

        Ok(Arc::clone(self.cache.entry(key).or_insert(account).value()))
    }

    /// Drop a cached account so the next lookup reconnects.
    pub fn evict(&self, chain: &ChainId, signer: &Address) {
        self.cache.remove(&(chain.clone(), signer.clone()));
    }
}
