//! Persisted deposit / settlement records owned by the external store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, ChainId, Timestamp};

/// Lifecycle of a deposit's settlement.
///
/// Transitions only run `Pending -> Processing -> {Settled, Failed, Pending}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositStatus {
    Pending,
    Processing,
    Failed,
    Settled,
}

impl DepositStatus {
    /// Numeric status code used by the relational store.
    pub fn code(&self) -> u16 {
        match self {
            DepositStatus::Pending => 1,
            DepositStatus::Processing => 96,
            DepositStatus::Failed => 97,
            DepositStatus::Settled => 98,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(DepositStatus::Pending),
            96 => Some(DepositStatus::Processing),
            97 => Some(DepositStatus::Failed),
            98 => Some(DepositStatus::Settled),
            _ => None,
        }
    }

    /// Whether the store may move a record from `self` to `next`.
    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        matches!(
            (self, next),
            (DepositStatus::Pending, DepositStatus::Processing)
                | (DepositStatus::Processing, DepositStatus::Settled)
                | (DepositStatus::Processing, DepositStatus::Failed)
                | (DepositStatus::Processing, DepositStatus::Pending)
        )
    }
}

/// Routing instructions attached to the source deposit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRoute {
    /// Pay the same user on the target chain.
    #[default]
    Direct,
    /// Pay a different recipient address.
    CrossAddress,
    /// Pay in a different token, bounded by a slippage floor.
    CrossToken {
        /// Raw target-token amount the user asked for.
        expected_value: u128,
        /// Tolerated shortfall in basis points of `expected_value`.
        slip_point: u32,
    },
}

/// One deposit and, once paid, its settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAmountTransaction {
    /// Row id in the relational store.
    pub transaction_id: u64,
    /// Source deposit hash, lower-cased.
    pub source_id: String,
    pub source_chain: ChainId,
    pub source_token: Address,
    pub source_symbol: String,
    pub source_amount: Decimal,
    pub source_nonce: String,
    pub source_time: Timestamp,
    pub source_address: Address,
    pub source_maker: Address,
    pub target_chain: ChainId,
    pub target_token: Address,
    pub target_symbol: String,
    pub target_amount: Decimal,
    pub target_address: Address,
    /// The maker expected to pay this deposit.
    pub target_maker: Address,
    /// Candidate signers allowed to pay, in preference order.
    pub response_maker: Vec<Address>,
    #[serde(default)]
    pub route: SourceRoute,
    pub status: DepositStatus,
    /// Destination tx hash once a payout has been recorded.
    #[serde(default)]
    pub target_id: Option<String>,
}

impl TransferAmountTransaction {
    pub fn has_target_id(&self) -> bool {
        self.target_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            DepositStatus::Pending,
            DepositStatus::Processing,
            DepositStatus::Failed,
            DepositStatus::Settled,
        ] {
            assert_eq!(DepositStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(DepositStatus::from_code(0), None);
    }

    #[test]
    fn only_forward_transitions_and_revert_are_allowed() {
        use DepositStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Settled));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Settled));
        assert!(!Settled.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Processing));
    }
}
