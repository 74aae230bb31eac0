//! In-memory trade pool.

use dashmap::DashMap;
use maker_types::{PoolKey, SwapOrder};

/// Pending orders grouped by [`PoolKey`], oldest first.
///
/// A source hash appears at most once per key. Keys are dropped when
/// their queue empties.
#[derive(Default)]
pub struct TradePool {
    pools: DashMap<PoolKey, Vec<SwapOrder>>,
}

impl TradePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `order` at the back of its key. Returns `false` when its hash
    /// is already queued there.
    pub fn push(&self, order: SwapOrder) -> bool {
        let mut queue = self.pools.entry(order.pool_key()).or_default();
        if queue.iter().any(|o| o.hash == order.hash) {
            return false;
        }
        queue.push(order);
        true
    }

    pub fn contains(&self, key: &PoolKey, hash: &str) -> bool {
        self.pools
            .get(key)
            .is_some_and(|queue| queue.iter().any(|o| o.hash == hash))
    }

    /// Whether `hash` is queued under any key.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.pools
            .iter()
            .any(|entry| entry.value().iter().any(|o| o.hash == hash))
    }

    /// Dequeue every order under `key`.
    pub fn take(&self, key: &PoolKey) -> Vec<SwapOrder> {
        self.pools
            .remove(key)
            .map(|(_, queue)| queue)
            .unwrap_or_default()
    }

    /// Put dequeued orders back ahead of anything queued since.
    pub fn restore(&self, key: &PoolKey, orders: Vec<SwapOrder>) {
        if orders.is_empty() {
            return;
        }
        let mut queue = self.pools.entry(key.clone()).or_default();
        let fresh: Vec<SwapOrder> = orders
            .into_iter()
            .filter(|o| !queue.iter().any(|q| q.hash == o.hash))
            .collect();
        queue.splice(0..0, fresh);
    }

    pub fn len(&self, key: &PoolKey) -> usize {
        self.pools.get(key).map_or(0, |queue| queue.len())
    }

    pub fn total(&self) -> usize {
        self.pools.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Non-empty keys in order.
    pub fn keys(&self) -> Vec<PoolKey> {
        let mut keys: Vec<PoolKey> = self
            .pools
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Snapshot of the orders under `key`.
    pub fn orders(&self, key: &PoolKey) -> Vec<SwapOrder> {
        self.pools
            .get(key)
            .map(|queue| queue.clone())
            .unwrap_or_default()
    }
}
