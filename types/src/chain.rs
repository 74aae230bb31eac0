//! Chain metadata and per-chain settlement tunables.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Address;

/// Chain identifier as used by deposit records (`"1"`, `"42161"`, `"SN_MAIN"`).
///
/// Stored lower-cased so lookups are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChainId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<ChainId> for String {
    fn from(c: ChainId) -> Self {
        c.0
    }
}

/// Wallet family that knows how to sign for a chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    #[default]
    Evm,
    StarkNet,
    ZkSync,
    Loopring,
    Imx,
}

/// A token known on one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub address: Address,
    pub decimals: u32,
    #[serde(default)]
    pub is_native: bool,
}

/// Static metadata for one chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: ChainId,
    pub name: String,
    #[serde(default)]
    pub family: ChainFamily,
    pub native_currency: Token,
    #[serde(default)]
    pub tokens: Vec<Token>,
    /// Multi-recipient transfer contract, required for batch payouts.
    #[serde(default)]
    pub router: Option<Address>,
}

/// Per-chain tunables that drive collection, cadence, batching and risk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Maximum age of a collectible deposit.
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,

    /// Minimum gap between two executions in the same lock domain.
    #[serde(default = "default_transfer_interval_ms")]
    pub transfer_interval_ms: u64,

    /// Orders needed before a batch payout is used; `<= 1` disables batching.
    #[serde(default = "default_batch_transfer_count")]
    pub batch_transfer_count: usize,

    /// Maximum tolerated target/source USD ratio, in percent.
    #[serde(default = "default_risk_ratio")]
    pub risk_ratio: u32,

    /// Whether deposits on this chain are settled automatically.
    #[serde(default = "default_true")]
    pub auto_payment: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_transfer_timeout_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_transfer_interval_ms() -> u64 {
    5_000
}

fn default_batch_transfer_count() -> usize {
    1
}

fn default_risk_ratio() -> u32 {
    150
}

fn default_true() -> bool {
    true
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            transfer_timeout_ms: default_transfer_timeout_ms(),
            transfer_interval_ms: default_transfer_interval_ms(),
            batch_transfer_count: default_batch_transfer_count(),
            risk_ratio: default_risk_ratio(),
            auto_payment: default_true(),
        }
    }
}

impl ChainSettings {
    pub fn batching_enabled(&self) -> bool {
        self.batch_transfer_count > 1
    }
}
