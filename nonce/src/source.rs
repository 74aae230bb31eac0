//! Network view of a signer's nonce.

use async_trait::async_trait;
use maker_types::{Address, ChainId};

use crate::NonceError;

/// Reports the next nonce the chain expects from `signer`.
///
/// Implemented by each chain family's RPC client.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn network_nonce(&self, chain: &ChainId, signer: &Address) -> Result<u64, NonceError>;
}
