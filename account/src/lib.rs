//! Account capability interface for paying out settlements.
//!
//! Each chain family (EVM, StarkNet, zkSync, Loopring, IMX) supplies an
//! [`Account`] implementation through an [`AccountFactory`]. The sequencer
//! and validator only ever see `Arc<dyn Account>`; the [`AccountRegistry`]
//! picks the factory from the chain's family and caches connected accounts
//! per `(chain, signer)`.

pub mod account;
pub mod error;
pub mod factory;
pub mod request;
pub mod send;

pub use account::Account;
pub use error::AccountError;
pub use factory::{AccountContext, AccountFactory, AccountRegistry};
pub use request::{TransferRequest, TransferResponse};
pub use send::send_with_nonce_lease;
