//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the settlement engine (clock, embedded
//! store, deposit repository, chain RPC) sits behind a trait. This crate
//! provides in-memory implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (balances, scripted failures, delays)
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod deposit;
pub mod store;

pub use chain::{NullAccount, NullAccountFactory, NullChain, NullFailure, SentTransfer};
pub use clock::NullClock;
pub use deposit::NullDepositRepository;
pub use store::{NullNonceStore, NullSerialStore};
