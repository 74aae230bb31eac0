use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use maker_types::{Clock, Timestamp};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::PriceOracle;
use crate::OracleError;

const USD: &str = "USD";

#[derive(Clone, Copy, Debug)]
struct RateTick {
    rate: Decimal,
    updated: Timestamp,
}

/// Cached exchange rates with a time-to-live.
///
/// Quotes try the direct pair, then the inverse pair, then a conversion
/// through USD prices. Rates older than the TTL are ignored.
pub struct RateTable {
    usd_prices: RwLock<HashMap<String, RateTick>>,
    pairs: RwLock<HashMap<(String, String), RateTick>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

impl RateTable {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            usd_prices: RwLock::new(HashMap::new()),
            pairs: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Record the USD price of one unit of `symbol`.
    pub async fn set_usd_price(&self, symbol: &str, price: Decimal) {
        let tick = RateTick {
            rate: price,
            updated: self.clock.now(),
        };
        self.usd_prices.write().await.insert(normalize(symbol), tick);
    }

    /// Record how many `to` one unit of `from` buys.
    pub async fn set_pair_rate(&self, from: &str, to: &str, rate: Decimal) {
        let tick = RateTick {
            rate,
            updated: self.clock.now(),
        };
        self.pairs
            .write()
            .await
            .insert((normalize(from), normalize(to)), tick);
    }

    fn fresh(&self, tick: &RateTick) -> Option<Decimal> {
        let age = tick.updated.elapsed_since(self.clock.now());
        (age <= self.ttl.as_millis() as u64 && tick.rate > Decimal::ZERO).then_some(tick.rate)
    }

    async fn usd_price(&self, symbol: &str) -> Option<Decimal> {
        if symbol == USD {
            return Some(Decimal::ONE);
        }
        let prices = self.usd_prices.read().await;
        prices.get(symbol).and_then(|tick| self.fresh(tick))
    }

    /// Conversion rate from one unit of `from` to `to`, if known.
    pub async fn rate(&self, from: &str, to: &str) -> Option<Decimal> {
        let (from, to) = (normalize(from), normalize(to));
        if from == to {
            return Some(Decimal::ONE);
        }
        {
            let pairs = self.pairs.read().await;
            if let Some(rate) = pairs
                .get(&(from.clone(), to.clone()))
                .and_then(|tick| self.fresh(tick))
            {
                return Some(rate);
            }
            if let Some(inverse) = pairs
                .get(&(to.clone(), from.clone()))
                .and_then(|tick| self.fresh(tick))
            {
                return Decimal::ONE.checked_div(inverse);
            }
        }
        let from_usd = self.usd_price(&from).await?;
        let to_usd = self.usd_price(&to).await?;
        from_usd.checked_div(to_usd)
    }
}

#[async_trait]
impl PriceOracle for RateTable {
    async fn quote(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, OracleError> {
        match self.rate(from, to).await {
            Some(rate) => Ok(amount.checked_mul(rate).unwrap_or(Decimal::ZERO)),
            None => {
                tracing::debug!(from, to, "no exchange rate");
                Ok(Decimal::ZERO)
            }
        }
    }
}
