//! Exclusive sections per paying wallet.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use maker_types::Address;
use tokio::sync::Mutex;

/// One async mutex per signer, created on first use.
#[derive(Default)]
pub struct WalletLocks {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, signer: &Address) -> Arc<Mutex<()>> {
        self.locks
            .entry(signer.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `fut` while holding `signer`'s lock.
    pub async fn run_exclusive<F, T>(&self, signer: &Address, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.lock_for(signer);
        let _guard = lock.lock().await;
        fut.await
    }

    pub fn is_locked(&self, signer: &Address) -> bool {
        self.locks
            .get(signer)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_signer_sections_do_not_overlap() {
        let locks = Arc::new(WalletLocks::new());
        let signer = Address::parse("0x01").unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (locks, signer, active, max_active) =
                (locks.clone(), signer.clone(), active.clone(), max_active.clone());
            handles.push(tokio::spawn(async move {
                locks
                    .run_exclusive(&signer, async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_signers_are_independent() {
        let locks = WalletLocks::new();
        let a = Address::parse("0x01").unwrap();
        let b = Address::parse("0x02").unwrap();
        locks
            .run_exclusive(&a, async {
                assert!(locks.is_locked(&a));
                assert!(!locks.is_locked(&b));
                locks.run_exclusive(&b, async {}).await;
            })
            .await;
        assert!(!locks.is_locked(&a));
    }
}
