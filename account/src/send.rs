//! Broadcast under a nonce lease.

use std::future::Future;

use maker_nonce::NonceManager;

use crate::{AccountError, TransferResponse};

/// Lease the signer's next nonce, run `send` with it, then resolve the lease.
///
/// A successful send submits the lease. Any error rolls it back: the next
/// lease re-reads the network nonce, so a transaction that did land is
/// still accounted for. The signer's mutex is held for the whole send.
pub async fn send_with_nonce_lease<F, Fut>(
    manager: &NonceManager,
    send: F,
) -> Result<TransferResponse, AccountError>
where
    F: FnOnce(u64) -> Fut,
    Fut: Future<Output = Result<TransferResponse, AccountError>>,
{
    let lease = manager.get_next_nonce().await?;
    let nonce = lease.nonce();
    let signer = lease.signer().clone();

    match send(nonce).await {
        Ok(response) => {
            if let Err(e) = lease.submit() {
                tracing::error!(signer = %signer, nonce, hash = %response.hash, error = %e, "failed to persist submitted nonce");
            }
            Ok(response)
        }
        Err(err) => {
            if let Err(e) = lease.rollback() {
                tracing::error!(signer = %signer, nonce, error = %e, "failed to roll back nonce");
            }
            tracing::warn!(signer = %signer, nonce, error = %err, "send failed under nonce lease");
            Err(err)
        }
    }
}
