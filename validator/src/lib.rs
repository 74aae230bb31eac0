//! Validation for the maker settlement engine.
//!
//! - [`Validator::verify_from_tx`] turns a confirmed deposit into a [`SwapOrder`](maker_types::SwapOrder).
//! - [`Validator::verify_to_tx`] re-checks an order right before payout,
//!   including the USD rate-deviation guard.
//! - [`Validator::transaction_get_private_key`] / [`Validator::transaction_get_private_keys`]
//!   pick a signer with a known key and enough balance.

pub mod error;
pub mod keys;
pub mod oracle;
pub mod sender;
pub mod validator;

pub use error::{OracleError, ValidationError};
pub use keys::KeyStore;
pub use oracle::{CoinbaseRateFetcher, PriceOracle, RateTable, COINBASE_RATES_URL};
pub use sender::{SelectedSender, SenderAssignment, SenderGroup, SenderRejection};
pub use validator::Validator;
