//! Signer selection for payouts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use maker_account::Account;
use maker_types::{Address, ChainInfo, SwapOrder};

use crate::{ValidationError, Validator};

/// Why a candidate signer was passed over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderRejection {
    pub signer: Address,
    pub reason: String,
}

/// A signer able to pay one order.
pub struct SelectedSender {
    pub signer: Address,
    pub account: Arc<dyn Account>,
    /// Candidates tried before this one.
    pub rejections: Vec<SenderRejection>,
}

/// Orders assigned to one signer.
pub struct SenderGroup {
    pub signer: Address,
    pub account: Arc<dyn Account>,
    pub orders: Vec<SwapOrder>,
}

pub struct SenderAssignment {
    pub groups: Vec<SenderGroup>,
    pub rejected: Vec<(SwapOrder, ValidationError)>,
}

impl SenderAssignment {
    pub fn assigned_count(&self) -> usize {
        self.groups.iter().map(|g| g.orders.len()).sum()
    }
}

impl Validator {
    async fn usable_account(
        &self,
        chain: &ChainInfo,
        signer: &Address,
    ) -> Result<Arc<dyn Account>, String> {
        let key = self
            .keys
            .get(signer)
            .ok_or_else(|| "private key not found".to_string())?;
        self.accounts
            .account(chain, signer, &key)
            .await
            .map_err(|e| e.to_string())
    }

    /// First candidate with a known key and enough balance of the order's token.
    pub async fn transaction_get_private_key(
        &self,
        order: &SwapOrder,
        candidates: &[Address],
    ) -> Result<SelectedSender, ValidationError> {
        let chain = self
            .registry
            .chain_info(&order.chain_id)
            .ok_or_else(|| ValidationError::UnknownChain(order.chain_id.clone()))?;

        let mut rejections = Vec::new();
        for signer in candidates {
            let account = match self.usable_account(chain, signer).await {
                Ok(account) => account,
                Err(reason) => {
                    rejections.push(SenderRejection {
                        signer: signer.clone(),
                        reason,
                    });
                    continue;
                }
            };
            match account.get_balance(None, Some(&order.token)).await {
                Ok(balance) if balance >= order.value => {
                    return Ok(SelectedSender {
                        signer: signer.clone(),
                        account,
                        rejections,
                    });
                }
                Ok(balance) => rejections.push(SenderRejection {
                    signer: signer.clone(),
                    reason: format!("balance {balance} below required {}", order.value),
                }),
                Err(e) => rejections.push(SenderRejection {
                    signer: signer.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        for rejection in &rejections {
            tracing::warn!(hash = %order.hash, signer = %rejection.signer, reason = %rejection.reason, "signer rejected");
        }
        Err(ValidationError::NoUsableSender {
            hash: order.hash.clone(),
            rejections,
        })
    }

    /// Group orders by their assigned signer, checking the running balance.
    ///
    /// Each `(signer, token)` balance is fetched once and reduced by every
    /// order assigned against it, so a batch never exceeds what the signer
    /// holds. Orders that don't fit come back in `rejected`.
    pub async fn transaction_get_private_keys(&self, orders: Vec<SwapOrder>) -> SenderAssignment {
        let mut groups: BTreeMap<Address, SenderGroup> = BTreeMap::new();
        let mut remaining: HashMap<(Address, Address), u128> = HashMap::new();
        let mut rejected = Vec::new();

        for order in orders {
            let Some(chain) = self.registry.chain_info(&order.chain_id) else {
                let err = ValidationError::UnknownChain(order.chain_id.clone());
                rejected.push((order, err));
                continue;
            };
            let account = match self.usable_account(chain, &order.from).await {
                Ok(account) => account,
                Err(reason) => {
                    let err = ValidationError::NoUsableSender {
                        hash: order.hash.clone(),
                        rejections: vec![SenderRejection {
                            signer: order.from.clone(),
                            reason,
                        }],
                    };
                    rejected.push((order, err));
                    continue;
                }
            };

            let key = (order.from.clone(), order.token.clone());
            let available = match remaining.get(&key) {
                Some(available) => *available,
                None => match account.get_balance(None, Some(&order.token)).await {
                    Ok(balance) => balance,
                    Err(e) => {
                        rejected.push((order, e.into()));
                        continue;
                    }
                },
            };
            if available < order.value {
                remaining.insert(key, available);
                let err = ValidationError::InsufficientBalance {
                    hash: order.hash.clone(),
                    signer: order.from.clone(),
                    needed: order.value,
                    available,
                };
                rejected.push((order, err));
                continue;
            }
            remaining.insert(key, available - order.value);

            groups
                .entry(order.from.clone())
                .or_insert_with(|| SenderGroup {
                    signer: order.from.clone(),
                    account,
                    orders: Vec::new(),
                })
                .orders
                .push(order);
        }

        SenderAssignment {
            groups: groups.into_values().collect(),
            rejected,
        }
    }
}
