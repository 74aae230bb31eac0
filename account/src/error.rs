use maker_nonce::NonceError;
use maker_types::ChainFamily;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u128, available: u128 },

    #[error("fee estimation failed: {0}")]
    FeeEstimation(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("recipient/value length mismatch: {recipients} recipients, {values} values")]
    LengthMismatch { recipients: usize, values: usize },

    #[error("nonce conflict: {0}")]
    NonceConflict(String),

    #[error("nonce lease failed: {0}")]
    Nonce(#[from] NonceError),

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("confirmation failed: {0}")]
    Confirmation(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("no account factory for chain family {0:?}")]
    Unsupported(ChainFamily),

    #[error("invalid signer key: {0}")]
    Key(String),
}

impl AccountError {
    /// Whether the failure happened before anything reached the chain.
    ///
    /// Preflight failures leave the deposit claimable again; everything else
    /// may have broadcast and is terminal for the order.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            AccountError::InsufficientBalance { .. }
                | AccountError::FeeEstimation(_)
                | AccountError::MissingConfig(_)
                | AccountError::LengthMismatch { .. }
                | AccountError::NonceConflict(_)
                | AccountError::Nonce(_)
                | AccountError::Key(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_classification() {
        assert!(AccountError::InsufficientBalance { needed: 2, available: 1 }.is_preflight());
        assert!(AccountError::NonceConflict("nonce too low".into()).is_preflight());
        assert!(AccountError::Nonce(NonceError::Refresh("down".into())).is_preflight());
        assert!(!AccountError::Broadcast("reverted".into()).is_preflight());
        assert!(!AccountError::Confirmation("timeout".into()).is_preflight());
        assert!(!AccountError::Rpc("502".into()).is_preflight());
    }
}
