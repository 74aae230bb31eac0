//! Swap orders: the in-memory payout obligations the sequencer executes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Address, ChainId, Timestamp};

/// How an order is paid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapOrderType {
    /// Unclassified; never executable.
    None,
    /// Same token, same user.
    Ua,
    /// Same token, different recipient.
    CrossAddr,
    /// Different token, priced at execution time.
    CrossToken,
}

/// Source-side facts an order was derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calldata {
    pub source_chain: ChainId,
    /// Source deposit hash, lower-cased.
    pub source_hash: String,
    pub source_symbol: String,
    /// Raw source-token amount.
    pub source_value: u128,
    pub source_nonce: String,
    pub timestamp: Timestamp,
    /// Slippage tolerance in basis points (cross-token only).
    pub slip_point: Option<u32>,
    /// Raw target amount the user asked for (cross-token only).
    pub expected_value: Option<u128>,
}

/// One pending payout obligation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOrder {
    /// Target chain.
    pub chain_id: ChainId,
    /// Source deposit hash; unique per pool key.
    pub hash: String,
    /// Row id of the deposit in the relational store.
    pub deposit_id: u64,
    /// Target token address.
    pub token: Address,
    /// Paying signer.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Target token symbol.
    pub symbol: String,
    /// Raw target-token amount to pay.
    pub value: u128,
    pub calldata: Calldata,
    pub order_type: SwapOrderType,
    #[serde(default)]
    pub error: Option<String>,
}

impl SwapOrder {
    pub fn pool_key(&self) -> PoolKey {
        PoolKey::new(self.chain_id.clone(), self.from.clone(), &self.symbol)
    }

    pub fn lock_domain(&self) -> LockDomain {
        LockDomain::new(self.chain_id.clone(), self.from.clone())
    }
}

/// Orders queue together under `(target chain, signer, token symbol)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub chain_id: ChainId,
    pub signer: Address,
    /// Lower-cased token symbol.
    pub symbol: String,
}

impl PoolKey {
    pub fn new(chain_id: ChainId, signer: Address, symbol: &str) -> Self {
        Self {
            chain_id,
            signer,
            symbol: symbol.to_ascii_lowercase(),
        }
    }

    pub fn lock_domain(&self) -> LockDomain {
        LockDomain::new(self.chain_id.clone(), self.signer.clone())
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.chain_id, self.signer, self.symbol)
    }
}

/// Executions for the same `(chain, signer)` are mutually exclusive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockDomain {
    pub chain_id: ChainId,
    pub signer: Address,
}

impl LockDomain {
    pub fn new(chain_id: ChainId, signer: Address) -> Self {
        Self { chain_id, signer }
    }
}

impl fmt::Display for LockDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.chain_id, self.signer)
    }
}
