use maker_account::AccountError;
use maker_ledger::LedgerError;
use maker_store::StoreError;
use maker_validator::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("no usable sender: {0}")]
    NoSender(ValidationError),

    #[error("claim lost: {claimed} of {expected} deposits moved to processing")]
    ClaimLost { expected: usize, claimed: usize },

    #[error("send rejected before broadcast: {0}")]
    Preflight(AccountError),

    #[error("send failed: {0}")]
    Send(AccountError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("batch has no payable orders")]
    EmptyBatch,

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl SequencerError {
    /// Classify an account failure by whether it reached the chain.
    pub fn from_account(err: AccountError) -> Self {
        if err.is_preflight() {
            SequencerError::Preflight(err)
        } else {
            SequencerError::Send(err)
        }
    }

    /// Whether the dequeued orders go back to the pool for a later tick.
    ///
    /// Recoverable failures happened before anything was broadcast and left
    /// the deposit records at pending.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SequencerError::NoSender(_)
                | SequencerError::ClaimLost { .. }
                | SequencerError::Preflight(_)
                | SequencerError::Ledger(_)
                | SequencerError::Store(_)
        )
    }
}
