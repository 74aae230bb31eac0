//! Price quotation.

mod coinbase;
mod rate_table;

pub use coinbase::{CoinbaseRateFetcher, COINBASE_RATES_URL};
pub use rate_table::RateTable;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::OracleError;

/// Converts an amount between token symbols (or `"USD"`).
///
/// Returns zero when no rate is known; callers treat a non-positive quote
/// as a rejection.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn quote(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, OracleError>;
}
