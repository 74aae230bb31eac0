use maker_account::AccountError;
use maker_store::StoreError;
use maker_types::{Address, ChainId, DepositStatus, TypesError};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::SenderRejection;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("price feed request failed: {0}")]
    Http(String),

    #[error("price feed response malformed: {0}")]
    Decode(String),
}

/// Why a deposit or order may not be paid.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{hash} already paid by {target_id}")]
    AlreadyPaid { hash: String, target_id: String },

    #[error("{hash} status is {status:?}, expected Pending")]
    StatusChanged { hash: String, status: DepositStatus },

    #[error("{hash} deposit record not found")]
    DepositMissing { hash: String },

    #[error("{hash} deposit record does not match order: {field}")]
    RecordMismatch { hash: String, field: &'static str },

    #[error("chain {0} not configured")]
    UnknownChain(ChainId),

    #[error("token {token} not found on chain {chain}")]
    UnknownToken { chain: ChainId, token: String },

    #[error("{hash} collection window elapsed")]
    Expired { hash: String },

    #[error("{hash} invalid amount: {reason}")]
    InvalidAmount { hash: String, reason: String },

    #[error("{hash} invalid recipient")]
    InvalidRecipient { hash: String },

    #[error("{hash} already has a settlement record")]
    DuplicateSettlement { hash: String },

    #[error("no private key for signer {signer}")]
    MissingKey { signer: Address },

    #[error("{hash} order type is unclassified")]
    Unclassified { hash: String },

    #[error("{hash} recipient {to} is blacklisted")]
    Blacklisted { hash: String, to: Address },

    #[error("{hash} no exchange rate for {pair}")]
    NoQuote { hash: String, pair: String },

    #[error("{hash} blocked by risk guard: target/source ratio {ratio}% >= {limit}%")]
    RiskRatio {
        hash: String,
        ratio: Decimal,
        limit: u32,
    },

    #[error("{hash} quote {quoted} below slippage floor {minimum}")]
    SlippageExceeded {
        hash: String,
        quoted: u128,
        minimum: u128,
    },

    #[error("{hash} signer {signer} balance {available} below required {needed}")]
    InsufficientBalance {
        hash: String,
        signer: Address,
        needed: u128,
        available: u128,
    },

    #[error("{hash} no usable signer: {rejections:?}")]
    NoUsableSender {
        hash: String,
        rejections: Vec<SenderRejection>,
    },

    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("type error: {0}")]
    Types(#[from] TypesError),
}
