//! LMDB storage backend for the maker settlement engine.
//!
//! Implements the embedded storage traits from `maker-store` using the `heed`
//! LMDB bindings. Serial records, nonces and metadata live in named
//! databases within a single environment.

pub mod environment;
pub mod error;
pub mod meta;
pub mod migration;
pub mod nonce;
pub mod serial;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use meta::LmdbMetaStore;
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};
pub use nonce::LmdbNonceStore;
pub use serial::LmdbSerialStore;

/// Build the composite key `scope ++ 0x00 ++ id`.
///
/// Chain ids and hex identifiers never contain a NUL byte, so the separator
/// keeps scopes from colliding.
pub(crate) fn scoped_key(scope: &str, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.len() + 1 + id.len());
    key.extend_from_slice(scope.as_bytes());
    key.push(0);
    key.extend_from_slice(id.as_bytes());
    key
}
