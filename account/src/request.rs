//! Transfer requests and responses exchanged with an [`Account`](crate::Account).

use maker_types::{Address, SwapOrder};
use serde::{Deserialize, Serialize};

/// Per-transfer options. `serial_ids` are the source deposit hashes this
/// payout settles, carried so implementations can tag or log them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub serial_ids: Vec<String>,
}

impl TransferRequest {
    pub fn for_orders(orders: &[SwapOrder]) -> Self {
        Self {
            serial_ids: orders.iter().map(|o| o.hash.clone()).collect(),
        }
    }
}

/// What a broadcast returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResponse {
    /// Destination transaction hash.
    pub hash: String,
    pub from: Address,
    pub nonce: Option<u64>,
    /// Fee in raw native units, when known at broadcast time.
    pub fee: Option<u128>,
}
