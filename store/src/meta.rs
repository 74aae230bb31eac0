//! Metadata storage trait.

use crate::StoreError;

/// Generic key-value bookkeeping (schema version and similar) that doesn't
/// belong to the serial or nonce stores.
pub trait MetaStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a metadata value, `None` when absent.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn delete_meta(&self, key: &str) -> Result<(), StoreError>;

    /// Stored schema version; `0` for a fresh database.
    fn get_schema_version(&self) -> Result<u32, StoreError>;

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError>;
}
