//! Idempotency log: source deposit hash -> settlement outcome marker.

use maker_types::ChainId;

use crate::StoreError;

/// Persisted serial records, scoped by target chain.
///
/// A present record means the deposit was claimed for payout (marker) or
/// paid (destination tx hash) and must never be paid again. The log is not
/// a source of truth for order status.
pub trait SerialStore: Send + Sync {
    fn get_serial(&self, chain: &ChainId, source_id: &str) -> Result<Option<String>, StoreError>;

    /// Write every `(source_id, outcome)` pair in one atomic batch.
    fn put_serials(&self, chain: &ChainId, entries: &[(String, String)]) -> Result<(), StoreError>;

    /// Remove the records for `source_ids`; missing ids are ignored.
    fn delete_serials(&self, chain: &ChainId, source_ids: &[String]) -> Result<(), StoreError>;
}
