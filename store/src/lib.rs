//! Abstract storage traits for the maker settlement engine.
//!
//! The embedded key-value log (serial records, nonces, metadata) and the
//! external relational deposit store are both reached only through these
//! traits. Backends: LMDB in `maker-store-lmdb`, in-memory in `maker-nullables`.

pub mod deposit;
pub mod error;
pub mod meta;
pub mod nonce;
pub mod serial;

pub use deposit::{DepositFilter, DepositRepository, SettlementRecord};
pub use error::StoreError;
pub use meta::MetaStore;
pub use nonce::{NonceRecord, NonceStore};
pub use serial::SerialStore;
