//! Nullable chain: in-memory balances, nonces and broadcasts.
//!
//! [`NullChain`] is shared by every [`NullAccount`] a [`NullAccountFactory`]
//! connects. A successful send lands instantly: balances drop, the network
//! nonce advances, and the transfer is recorded for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use maker_account::{
    send_with_nonce_lease, Account, AccountContext, AccountError, AccountFactory, TransferRequest,
    TransferResponse,
};
use maker_nonce::{NonceError, NonceManager, NonceSource};
use maker_types::{Address, ChainFamily, ChainId, ChainInfo, PrivateKey};

/// A scripted failure for the next send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NullFailure {
    /// Rejected before broadcast (fee estimation).
    Preflight,
    /// The chain refused the nonce.
    NonceConflict,
    /// Broadcast failed; nothing landed.
    Broadcast,
    /// The transaction landed but confirmation failed.
    Confirmation,
}

/// One transaction that reached the null chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransfer {
    pub chain: ChainId,
    pub from: Address,
    /// `None` for native currency.
    pub token: Option<Address>,
    pub recipients: Vec<Address>,
    pub values: Vec<u128>,
    pub nonce: u64,
    pub hash: String,
    pub serial_ids: Vec<String>,
}

struct Payment<'a> {
    chain: &'a ChainId,
    from: &'a Address,
    token: Option<&'a Address>,
    balance_key: &'a Address,
    recipients: &'a [Address],
    values: &'a [u128],
    request: TransferRequest,
}

#[derive(Default)]
pub struct NullChain {
    balances: Mutex<HashMap<(ChainId, Address, Address), u128>>,
    network_nonces: Mutex<HashMap<(ChainId, Address), u64>>,
    sent: Mutex<Vec<SentTransfer>>,
    failures: Mutex<VecDeque<NullFailure>>,
    send_delay: Mutex<Duration>,
    sequence: AtomicU64,
}

impl NullChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance of `token` (the native currency address for native).
    pub fn set_balance(&self, chain: &ChainId, signer: &Address, token: &Address, value: u128) {
        self.balances
            .lock()
            .unwrap()
            .insert((chain.clone(), signer.clone(), token.clone()), value);
    }

    pub fn balance(&self, chain: &ChainId, signer: &Address, token: &Address) -> u128 {
        self.balances
            .lock()
            .unwrap()
            .get(&(chain.clone(), signer.clone(), token.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_network_nonce(&self, chain: &ChainId, signer: &Address, nonce: u64) {
        self.network_nonces
            .lock()
            .unwrap()
            .insert((chain.clone(), signer.clone()), nonce);
    }

    pub fn network_nonce_of(&self, chain: &ChainId, signer: &Address) -> u64 {
        self.network_nonces
            .lock()
            .unwrap()
            .get(&(chain.clone(), signer.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Queue a failure for the next send on any account.
    pub fn fail_next(&self, failure: NullFailure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    /// Delay every broadcast, to widen race windows in tests.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<SentTransfer> {
        self.sent.lock().unwrap().clone()
    }

    fn land(&self, payment: &Payment<'_>, nonce: u64) -> SentTransfer {
        let mut balances = self.balances.lock().unwrap();
        for value in payment.values {
            let entry = balances
                .entry((
                    payment.chain.clone(),
                    payment.from.clone(),
                    payment.balance_key.clone(),
                ))
                .or_insert(0);
            *entry = entry.saturating_sub(*value);
        }
        for (to, value) in payment.recipients.iter().zip(payment.values) {
            *balances
                .entry((payment.chain.clone(), to.clone(), payment.balance_key.clone()))
                .or_insert(0) += *value;
        }
        drop(balances);

        let mut nonces = self.network_nonces.lock().unwrap();
        let network = nonces
            .entry((payment.chain.clone(), payment.from.clone()))
            .or_insert(0);
        *network = (*network).max(nonce + 1);
        drop(nonces);

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let sent = SentTransfer {
            chain: payment.chain.clone(),
            from: payment.from.clone(),
            token: payment.token.cloned(),
            recipients: payment.recipients.to_vec(),
            values: payment.values.to_vec(),
            nonce,
            hash: format!("0x{sequence:064x}"),
            serial_ids: payment.request.serial_ids.clone(),
        };
        self.sent.lock().unwrap().push(sent.clone());
        sent
    }

    async fn broadcast(&self, payment: Payment<'_>, nonce: u64) -> Result<TransferResponse, AccountError> {
        if payment.recipients.len() != payment.values.len() {
            return Err(AccountError::LengthMismatch {
                recipients: payment.recipients.len(),
                values: payment.values.len(),
            });
        }
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(NullFailure::Preflight) => {
                return Err(AccountError::FeeEstimation("scripted failure".into()))
            }
            Some(NullFailure::NonceConflict) => {
                return Err(AccountError::NonceConflict(format!("nonce {nonce} rejected")))
            }
            Some(NullFailure::Broadcast) => {
                return Err(AccountError::Broadcast("scripted failure".into()))
            }
            _ => {}
        }

        let needed = payment
            .values
            .iter()
            .try_fold(0u128, |acc, v| acc.checked_add(*v))
            .unwrap_or(u128::MAX);
        let available = self.balance(payment.chain, payment.from, payment.balance_key);
        if available < needed {
            return Err(AccountError::InsufficientBalance { needed, available });
        }

        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let sent = self.land(&payment, nonce);
        tracing::debug!(chain = %sent.chain, from = %sent.from, nonce, hash = %sent.hash, "null broadcast");
        if failure == Some(NullFailure::Confirmation) {
            return Err(AccountError::Confirmation(format!("{} unconfirmed", sent.hash)));
        }
        Ok(TransferResponse {
            hash: sent.hash,
            from: sent.from,
            nonce: Some(nonce),
            fee: Some(21_000),
        })
    }
}

#[async_trait]
impl NonceSource for NullChain {
    async fn network_nonce(&self, chain: &ChainId, signer: &Address) -> Result<u64, NonceError> {
        Ok(self.network_nonce_of(chain, signer))
    }
}

/// An [`Account`] backed by a [`NullChain`], leasing real nonces.
pub struct NullAccount {
    address: Address,
    chain: ChainInfo,
    state: Arc<NullChain>,
    nonces: Arc<NonceManager>,
}

impl NullAccount {
    async fn pay(
        &self,
        token: Option<&Address>,
        recipients: &[Address],
        values: &[u128],
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError> {
        let native = &self.chain.native_currency.address;
        let token = token.filter(|t| *t != native);
        let payment = Payment {
            chain: &self.chain.chain_id,
            from: &self.address,
            token,
            balance_key: token.unwrap_or(native),
            recipients,
            values,
            request,
        };
        send_with_nonce_lease(&self.nonces, |nonce| self.state.broadcast(payment, nonce)).await
    }
}

#[async_trait]
impl Account for NullAccount {
    fn address(&self) -> &Address {
        &self.address
    }

    fn chain_info(&self) -> &ChainInfo {
        &self.chain
    }

    async fn transfer(
        &self,
        to: &Address,
        value: u128,
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError> {
        self.pay(None, std::slice::from_ref(to), &[value], request).await
    }

    async fn transfer_token(
        &self,
        token: &Address,
        to: &Address,
        value: u128,
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError> {
        self.pay(Some(token), std::slice::from_ref(to), &[value], request)
            .await
    }

    async fn transfers(
        &self,
        to: &[Address],
        values: &[u128],
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError> {
        self.pay(None, to, values, request).await
    }

    async fn transfer_tokens(
        &self,
        token: &Address,
        to: &[Address],
        values: &[u128],
        request: TransferRequest,
    ) -> Result<TransferResponse, AccountError> {
        self.pay(Some(token), to, values, request).await
    }

    async fn get_native_balance(&self, address: Option<&Address>) -> Result<u128, AccountError> {
        let owner = address.unwrap_or(&self.address);
        Ok(self
            .state
            .balance(&self.chain.chain_id, owner, &self.chain.native_currency.address))
    }

    async fn get_token_balance(
        &self,
        token: &Address,
        address: Option<&Address>,
    ) -> Result<u128, AccountError> {
        let owner = address.unwrap_or(&self.address);
        Ok(self.state.balance(&self.chain.chain_id, owner, token))
    }
}

/// Connects [`NullAccount`]s for one chain family.
pub struct NullAccountFactory {
    state: Arc<NullChain>,
    family: ChainFamily,
    connects: AtomicUsize,
}

impl NullAccountFactory {
    pub fn new(state: Arc<NullChain>) -> Self {
        Self::with_family(state, ChainFamily::Evm)
    }

    pub fn with_family(state: Arc<NullChain>, family: ChainFamily) -> Self {
        Self {
            state,
            family,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountFactory for NullAccountFactory {
    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn connect(
        &self,
        ctx: AccountContext,
        _private_key: &PrivateKey,
    ) -> Result<Arc<dyn Account>, AccountError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let source: Arc<dyn NonceSource> = self.state.clone();
        let nonces = ctx
            .nonces
            .manager(&ctx.chain.chain_id, &ctx.signer, source);
        Ok(Arc::new(NullAccount {
            address: ctx.signer,
            chain: ctx.chain,
            state: Arc::clone(&self.state),
            nonces,
        }))
    }
}
