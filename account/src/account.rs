//! The chain account capability set.

use async_trait::async_trait;
use maker_types::{Address, ChainInfo, SwapOrder};

use crate::{AccountError, TransferRequest, TransferResponse};

/// A connected signer on one chain.
///
/// Implementations own their RPC client and lease nonces internally, usually
/// through [`send_with_nonce_lease`](crate::send_with_nonce_lease). Errors that
/// occur before broadcast must classify as
/// [`AccountError::is_preflight`].
#[async_trait]
pub trait Account: Send + Sync {
    /// The signer address this account pays from.
    fn address(&self) -> &Address;

    fn chain_info(&self) -> &ChainInfo;

    /// Pay native currency.
    async fn transfer(
        &self,
        to: &Address,
        value: u128,
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError>;

    /// Pay a token.
    async fn transfer_token(
        &self,
        token: &Address,
        to: &Address,
        value: u128,
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError>;

    /// Pay native currency to several recipients in one transaction.
    async fn transfers(
        &self,
        to: &[Address],
        values: &[u128],
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError>;

    /// Pay a token to several recipients in one transaction.
    async fn transfer_tokens(
        &self,
        token: &Address,
        to: &[Address],
        values: &[u128],
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError>;

    /// Native balance of `address` (default: this signer).
    async fn get_native_balance(&self, address: Option<&Address>) -> Result<u128, AccountError>;

    /// Token balance of `address` (default: this signer).
    async fn get_token_balance(
        &self,
        token: &Address,
        address: Option<&Address>,
    ) -> Result<u128, AccountError>;

    /// Balance of `token`, or native currency when `token` is `None` or native.
    async fn get_balance(
        &self,
        address: Option<&Address>,
        token: Option<&Address>,
    ) -> Result<u128, AccountError> {
        match token {
            Some(token) if !self.is_native(token) => self.get_token_balance(token, address).await,
            _ => self.get_native_balance(address).await,
        }
    }

    fn is_native(&self, token: &Address) -> bool {
        &self.chain_info().native_currency.address == token
    }

    /// Build the request for paying `orders`, tagging their serial ids.
    fn payment_before(&self, orders: &[SwapOrder]) -> TransferRequest {
        TransferRequest::for_orders(orders)
    }
}
