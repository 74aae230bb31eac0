//! Deposit and payout checks.

use std::collections::HashSet;
use std::sync::Arc;

use maker_account::AccountRegistry;
use maker_store::{DepositRepository, SerialStore};
use maker_types::{
    from_raw, to_raw, Address, Calldata, ChainId, ChainRegistry, Clock, DepositStatus,
    SourceRoute, SwapOrder, SwapOrderType, Timestamp, Token, TransferAmountTransaction,
};
use rust_decimal::Decimal;

use crate::{KeyStore, PriceOracle, ValidationError};

const BASIS_POINTS: u128 = 10_000;

/// Stateless checks over shared collaborators.
pub struct Validator {
    pub(crate) registry: Arc<ChainRegistry>,
    pub(crate) oracle: Arc<dyn PriceOracle>,
    pub(crate) keys: Arc<KeyStore>,
    pub(crate) accounts: Arc<AccountRegistry>,
    pub(crate) repository: Arc<dyn DepositRepository>,
    pub(crate) serials: Arc<dyn SerialStore>,
    pub(crate) blacklist: HashSet<Address>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Validator {
    pub fn new(
        registry: Arc<ChainRegistry>,
        oracle: Arc<dyn PriceOracle>,
        keys: Arc<KeyStore>,
        accounts: Arc<AccountRegistry>,
        repository: Arc<dyn DepositRepository>,
        serials: Arc<dyn SerialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            oracle,
            keys,
            accounts,
            repository,
            serials,
            blacklist: HashSet::new(),
            clock,
        }
    }

    pub fn with_blacklist(mut self, blacklist: impl IntoIterator<Item = Address>) -> Self {
        self.blacklist = blacklist.into_iter().collect();
        self
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// Whether a deposit made at `timestamp` is still collectible on `chain`.
    pub fn transaction_time_valid(&self, chain: &ChainId, timestamp: Timestamp) -> bool {
        let timeout = self.registry.settings(chain).transfer_timeout_ms;
        !timestamp.has_expired(timeout, self.clock.now())
    }

    fn target_token(&self, chain: &ChainId, symbol: &str) -> Result<&Token, ValidationError> {
        self.registry
            .token_by_symbol(chain, symbol)
            .ok_or_else(|| ValidationError::UnknownToken {
                chain: chain.clone(),
                token: symbol.to_string(),
            })
    }

    /// Turn a confirmed deposit into a payable order.
    pub async fn verify_from_tx(
        &self,
        tx: &TransferAmountTransaction,
    ) -> Result<SwapOrder, ValidationError> {
        let hash = tx.source_id.to_ascii_lowercase();

        if let Some(target_id) = tx.target_id.as_ref().filter(|id| !id.is_empty()) {
            return Err(ValidationError::AlreadyPaid {
                hash,
                target_id: target_id.clone(),
            });
        }
        if tx.status != DepositStatus::Pending {
            return Err(ValidationError::StatusChanged {
                hash,
                status: tx.status,
            });
        }
        if self.registry.chain_info(&tx.target_chain).is_none() {
            return Err(ValidationError::UnknownChain(tx.target_chain.clone()));
        }
        let target_token = self
            .registry
            .token_by_address(&tx.target_chain, &tx.target_token)
            .ok_or_else(|| ValidationError::UnknownToken {
                chain: tx.target_chain.clone(),
                token: tx.target_token.to_string(),
            })?;
        if !target_token.symbol.eq_ignore_ascii_case(&tx.target_symbol) {
            return Err(ValidationError::RecordMismatch {
                hash,
                field: "target_symbol",
            });
        }
        let source_token = self
            .registry
            .token_by_address(&tx.source_chain, &tx.source_token)
            .ok_or_else(|| ValidationError::UnknownToken {
                chain: tx.source_chain.clone(),
                token: tx.source_token.to_string(),
            })?;
        if !self.transaction_time_valid(&tx.target_chain, tx.source_time) {
            return Err(ValidationError::Expired { hash });
        }
        if tx.target_address.is_zero() {
            return Err(ValidationError::InvalidRecipient { hash });
        }

        let invalid_amount = |reason: String| ValidationError::InvalidAmount {
            hash: hash.clone(),
            reason,
        };
        let value = to_raw(tx.target_amount, target_token.decimals)
            .map_err(|e| invalid_amount(e.to_string()))?;
        let source_value = to_raw(tx.source_amount, source_token.decimals)
            .map_err(|e| invalid_amount(e.to_string()))?;
        if value == 0 || source_value == 0 {
            return Err(invalid_amount("zero amount".to_string()));
        }

        if self.serials.get_serial(&tx.target_chain, &hash)?.is_some() {
            return Err(ValidationError::DuplicateSettlement { hash });
        }

        let from = self.pick_signer(tx)?;
        let (order_type, slip_point, expected_value) = match &tx.route {
            SourceRoute::Direct => (SwapOrderType::Ua, None, None),
            SourceRoute::CrossAddress => (SwapOrderType::CrossAddr, None, None),
            SourceRoute::CrossToken {
                expected_value,
                slip_point,
            } => (
                SwapOrderType::CrossToken,
                Some(*slip_point),
                Some(*expected_value),
            ),
        };

        let mut order = SwapOrder {
            chain_id: tx.target_chain.clone(),
            hash: hash.clone(),
            deposit_id: tx.transaction_id,
            token: target_token.address.clone(),
            from,
            to: tx.target_address.clone(),
            symbol: target_token.symbol.clone(),
            value: expected_value.unwrap_or(value),
            calldata: Calldata {
                source_chain: tx.source_chain.clone(),
                source_hash: hash,
                source_symbol: source_token.symbol.clone(),
                source_value,
                source_nonce: tx.source_nonce.clone(),
                timestamp: tx.source_time,
                slip_point,
                expected_value,
            },
            order_type,
            error: None,
        };
        if order.order_type == SwapOrderType::CrossToken {
            order.value = self.cross_token_value(&order).await?;
        }
        Ok(order)
    }

    /// First of the target maker and the response makers whose key is known.
    fn pick_signer(&self, tx: &TransferAmountTransaction) -> Result<Address, ValidationError> {
        std::iter::once(&tx.target_maker)
            .chain(tx.response_maker.iter())
            .find(|signer| self.keys.contains(signer))
            .cloned()
            .ok_or_else(|| ValidationError::MissingKey {
                signer: tx.target_maker.clone(),
            })
    }

    /// Payable amount for a cross-token order.
    ///
    /// A live quote at or above the expected value pays the expected value;
    /// a quote within `slip_point` basis points below it pays the slippage
    /// floor; anything lower is rejected.
    pub async fn cross_token_value(&self, order: &SwapOrder) -> Result<u128, ValidationError> {
        let expected = order.calldata.expected_value.unwrap_or(order.value);
        let slip = u128::from(order.calldata.slip_point.unwrap_or(0)).min(BASIS_POINTS);
        let source_token =
            self.target_token(&order.calldata.source_chain, &order.calldata.source_symbol)?;
        let target_token = self.target_token(&order.chain_id, &order.symbol)?;

        let source_amount = from_raw(order.calldata.source_value, source_token.decimals)?;
        let quoted = self
            .oracle
            .quote(source_amount, &source_token.symbol, &target_token.symbol)
            .await?;
        if quoted <= Decimal::ZERO {
            return Err(ValidationError::NoQuote {
                hash: order.hash.clone(),
                pair: format!("{}:{}", source_token.symbol, target_token.symbol),
            });
        }
        let quoted = to_raw(quoted, target_token.decimals)?;
        let discount = expected
            .checked_mul(slip)
            .map(|v| v / BASIS_POINTS)
            .unwrap_or((expected / BASIS_POINTS) * slip);
        let minimum = expected - discount;

        if quoted >= expected {
            Ok(expected)
        } else if quoted >= minimum {
            tracing::info!(hash = %order.hash, quoted, expected, minimum, "cross-token paid at slippage floor");
            Ok(minimum)
        } else {
            Err(ValidationError::SlippageExceeded {
                hash: order.hash.clone(),
                quoted,
                minimum,
            })
        }
    }

    /// Target/source USD value ratio of an order, in percent.
    ///
    /// Rejects when either side has no USD quote or the ratio reaches the
    /// chain's `risk_ratio`.
    pub async fn check_risk_ratio(&self, order: &SwapOrder) -> Result<Decimal, ValidationError> {
        let source_token =
            self.target_token(&order.calldata.source_chain, &order.calldata.source_symbol)?;
        let target_token = self.target_token(&order.chain_id, &order.symbol)?;

        let source_amount = from_raw(order.calldata.source_value, source_token.decimals)?;
        let from_usd = self
            .oracle
            .quote(source_amount, &source_token.symbol, "USD")
            .await?;
        if from_usd <= Decimal::ZERO {
            return Err(ValidationError::NoQuote {
                hash: order.hash.clone(),
                pair: format!("{}:USD", source_token.symbol),
            });
        }
        let target_amount = from_raw(order.value, target_token.decimals)?;
        let to_usd = self
            .oracle
            .quote(target_amount, &target_token.symbol, "USD")
            .await?;
        if to_usd <= Decimal::ZERO {
            return Err(ValidationError::NoQuote {
                hash: order.hash.clone(),
                pair: format!("{}:USD", target_token.symbol),
            });
        }

        let limit = self.registry.settings(&order.chain_id).risk_ratio;
        let ratio = to_usd
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|v| v.checked_div(from_usd))
            .unwrap_or(Decimal::MAX);
        tracing::debug!(hash = %order.hash, %from_usd, %to_usd, %ratio, "risk ratio");
        if ratio >= Decimal::from(limit) {
            return Err(ValidationError::RiskRatio {
                hash: order.hash.clone(),
                ratio,
                limit,
            });
        }
        Ok(ratio)
    }

    /// Re-check an order immediately before payout.
    pub async fn verify_to_tx(&self, order: &SwapOrder) -> Result<(), ValidationError> {
        if !self.keys.contains(&order.from) {
            return Err(ValidationError::MissingKey {
                signer: order.from.clone(),
            });
        }
        if order.order_type == SwapOrderType::None {
            return Err(ValidationError::Unclassified {
                hash: order.hash.clone(),
            });
        }
        if !self.transaction_time_valid(&order.chain_id, order.calldata.timestamp) {
            return Err(ValidationError::Expired {
                hash: order.hash.clone(),
            });
        }
        if self.blacklist.contains(&order.to) {
            return Err(ValidationError::Blacklisted {
                hash: order.hash.clone(),
                to: order.to.clone(),
            });
        }

        self.check_risk_ratio(order).await?;

        if self.serials.get_serial(&order.chain_id, &order.hash)?.is_some()
            || self.repository.settlement_exists(&order.hash).await?
        {
            return Err(ValidationError::DuplicateSettlement {
                hash: order.hash.clone(),
            });
        }

        let record = self
            .repository
            .find_deposit(order.deposit_id)
            .await?
            .ok_or_else(|| ValidationError::DepositMissing {
                hash: order.hash.clone(),
            })?;
        if record.status != DepositStatus::Pending {
            return Err(ValidationError::StatusChanged {
                hash: order.hash.clone(),
                status: record.status,
            });
        }
        Ok(())
    }
}
