use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] maker_store::StoreError),

    #[error("compensation incomplete for {source_id}: {reason}")]
    Compensation { source_id: String, reason: String },
}
