//! Nonce leasing for maker signers.
//!
//! Every broadcast needs a nonce that no other in-flight broadcast of the
//! same signer holds. A [`NonceManager`] serializes allocation per
//! `(chain, signer)`: [`NonceManager::get_next_nonce`] hands out a
//! [`NonceLease`] that owns the signer's mutex until it is submitted or
//! rolled back. Persisted values survive restarts through a
//! [`maker_store::NonceStore`].

pub mod error;
pub mod lease;
pub mod manager;
pub mod source;

pub use error::NonceError;
pub use lease::NonceLease;
pub use manager::{NonceLeaseStore, NonceManager};
pub use source::NonceSource;
