//! Persisted nonce state per `(chain, signer)`.

use maker_types::{Address, ChainId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// The next nonce a signer may use and when it last sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRecord {
    pub nonce: u64,
    pub last_usage: Timestamp,
}

/// Nonce persistence. Must survive process restart.
pub trait NonceStore: Send + Sync {
    fn get_nonce(&self, chain: &ChainId, signer: &Address) -> Result<Option<NonceRecord>, StoreError>;

    fn put_nonce(&self, chain: &ChainId, signer: &Address, record: &NonceRecord) -> Result<(), StoreError>;
}
