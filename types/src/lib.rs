//! Fundamental types for the maker settlement engine.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! addresses, chain metadata, amounts, timestamps, deposit records and swap orders.

pub mod address;
pub mod amount;
pub mod chain;
pub mod deposit;
pub mod error;
pub mod keys;
pub mod order;
pub mod registry;
pub mod time;

pub use address::Address;
pub use amount::{from_raw, to_raw};
pub use chain::{ChainFamily, ChainId, ChainInfo, ChainSettings, Token};
pub use deposit::{DepositStatus, SourceRoute, TransferAmountTransaction};
pub use error::TypesError;
pub use keys::PrivateKey;
pub use order::{Calldata, LockDomain, PoolKey, SwapOrder, SwapOrderType};
pub use registry::ChainRegistry;
pub use time::{Clock, SystemClock, Timestamp};
