use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::RateTable;
use crate::OracleError;

/// Coinbase public exchange-rate endpoint, quoted against USD.
pub const COINBASE_RATES_URL: &str = "https://api.coinbase.com/v2/exchange-rates?currency=USD";

#[derive(Debug, Deserialize)]
struct ExchangeRatesResponse {
    data: ExchangeRates,
}

#[derive(Debug, Deserialize)]
struct ExchangeRates {
    rates: HashMap<String, String>,
}

/// Parse a Coinbase exchange-rate body into USD prices per symbol.
///
/// The feed lists how many units of each symbol one USD buys; the price is
/// the inverse. Entries that don't parse as positive decimals are skipped.
pub(crate) fn parse_usd_prices(body: &str) -> Result<Vec<(String, Decimal)>, OracleError> {
    let response: ExchangeRatesResponse =
        serde_json::from_str(body).map_err(|e| OracleError::Decode(e.to_string()))?;
    let prices = response
        .data
        .rates
        .into_iter()
        .filter_map(|(symbol, raw)| {
            let per_usd = Decimal::from_str(&raw).ok()?;
            if per_usd <= Decimal::ZERO {
                return None;
            }
            Some((symbol, Decimal::ONE.checked_div(per_usd)?))
        })
        .collect();
    Ok(prices)
}

/// Periodically refreshes a [`RateTable`] from the Coinbase rate feed.
pub struct CoinbaseRateFetcher {
    client: reqwest::Client,
    url: String,
    table: Arc<RateTable>,
}

impl CoinbaseRateFetcher {
    pub fn new(
        table: Arc<RateTable>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| OracleError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            table,
        })
    }

    /// Fetch once and store every parsed price. Returns how many were stored.
    pub async fn refresh(&self) -> Result<usize, OracleError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OracleError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;
        let prices = parse_usd_prices(&body)?;
        for (symbol, price) in &prices {
            self.table.set_usd_price(symbol, *price).await;
        }
        tracing::trace!(count = prices.len(), "usd prices refreshed");
        Ok(prices.len())
    }

    /// Refresh every `interval` until `shutdown` fires.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("rate fetcher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh().await {
                            tracing::warn!(error = %e, "failed to refresh exchange rates");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_inverts_rates() {
        let body = r#"{"data":{"currency":"USD","rates":{"ETH":"0.0005","USDC":"1.0","BAD":"x","ZERO":"0"}}}"#;
        let mut prices = parse_usd_prices(body).unwrap();
        prices.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            prices,
            vec![
                ("ETH".to_string(), Decimal::from(2000)),
                ("USDC".to_string(), Decimal::ONE),
            ]
        );
    }

    #[test]
    fn malformed_body_is_decode_error() {
        assert!(matches!(parse_usd_prices("{}"), Err(OracleError::Decode(_))));
    }
}
