use maker_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("network nonce refresh failed: {0}")]
    Refresh(String),

    #[error("nonce store error: {0}")]
    Store(#[from] StoreError),
}
