//! Top-level error type for type construction and parsing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount {raw} does not fit {decimals} decimals")]
    AmountOverflow { raw: String, decimals: u32 },

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid chain registry: {0}")]
    Registry(String),
}
