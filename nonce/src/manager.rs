//! Per-signer nonce managers and the process-wide registry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use maker_store::{NonceRecord, NonceStore};
use maker_types::{Address, ChainId, Clock};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::{NonceError, NonceLease, NonceSource};

/// Serializes nonce allocation for one `(chain, signer)`.
pub struct NonceManager {
    chain: ChainId,
    signer: Address,
    store: Arc<dyn NonceStore>,
    source: Arc<dyn NonceSource>,
    clock: Arc<dyn Clock>,
    lock: Arc<Mutex<()>>,
}

impl NonceManager {
    pub fn new(
        chain: ChainId,
        signer: Address,
        store: Arc<dyn NonceStore>,
        source: Arc<dyn NonceSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chain,
            signer,
            store,
            source,
            clock,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Lease `max(persisted, network)`.
    ///
    /// Waits while another lease for this signer is outstanding. A failed
    /// network refresh releases the mutex without persisting anything.
    pub async fn get_next_nonce(&self) -> Result<NonceLease, NonceError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let network = self.source.network_nonce(&self.chain, &self.signer).await?;
        let persisted = self.store.get_nonce(&self.chain, &self.signer)?;

        let nonce = match persisted {
            Some(record) if record.nonce >= network => record.nonce,
            Some(record) => {
                tracing::info!(
                    chain = %self.chain,
                    signer = %self.signer,
                    persisted = record.nonce,
                    network,
                    "network nonce ahead of persisted value"
                );
                self.store.put_nonce(
                    &self.chain,
                    &self.signer,
                    &NonceRecord {
                        nonce: network,
                        last_usage: record.last_usage,
                    },
                )?;
                network
            }
            None => {
                self.store.put_nonce(
                    &self.chain,
                    &self.signer,
                    &NonceRecord {
                        nonce: network,
                        last_usage: self.clock.now(),
                    },
                )?;
                network
            }
        };

        Ok(NonceLease::new(
            nonce,
            self.chain.clone(),
            self.signer.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            guard,
        ))
    }

    /// Re-poll the network nonce when the signer has been idle longer than
    /// `idle_threshold`, bumping the persisted value upward if the chain shows
    /// sends this process did not make. Returns whether a bump happened.
    ///
    /// Skips silently while a lease is outstanding.
    pub async fn refresh_if_idle(&self, idle_threshold: Duration) -> Result<bool, NonceError> {
        let Ok(_guard) = Arc::clone(&self.lock).try_lock_owned() else {
            return Ok(false);
        };
        let Some(record) = self.store.get_nonce(&self.chain, &self.signer)? else {
            return Ok(false);
        };
        let idle_ms = record.last_usage.elapsed_since(self.clock.now());
        if idle_ms <= idle_threshold.as_millis() as u64 {
            return Ok(false);
        }

        let network = self.source.network_nonce(&self.chain, &self.signer).await?;
        if network <= record.nonce {
            return Ok(false);
        }
        self.store.put_nonce(
            &self.chain,
            &self.signer,
            &NonceRecord {
                nonce: network,
                last_usage: record.last_usage,
            },
        )?;
        tracing::info!(
            chain = %self.chain,
            signer = %self.signer,
            from = record.nonce,
            to = network,
            "idle nonce refreshed from network"
        );
        Ok(true)
    }
}

/// Owns one [`NonceManager`] per `(chain, signer)` for the process lifetime.
pub struct NonceLeaseStore {
    store: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    managers: DashMap<(ChainId, Address), Arc<NonceManager>>,
}

impl NonceLeaseStore {
    pub fn new(store: Arc<dyn NonceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            managers: DashMap::new(),
        }
    }

    /// The manager for `(chain, signer)`, created with `source` on first use.
    pub fn manager(
        &self,
        chain: &ChainId,
        signer: &Address,
        source: Arc<dyn NonceSource>,
    ) -> Arc<NonceManager> {
        self.managers
            .entry((chain.clone(), signer.clone()))
            .or_insert_with(|| {
                Arc::new(NonceManager::new(
                    chain.clone(),
                    signer.clone(),
                    Arc::clone(&self.store),
                    source,
                    Arc::clone(&self.clock),
                ))
            })
            .clone()
    }

    pub async fn get_next_nonce(
        &self,
        chain: &ChainId,
        signer: &Address,
        source: Arc<dyn NonceSource>,
    ) -> Result<NonceLease, NonceError> {
        self.manager(chain, signer, source).get_next_nonce().await
    }

    /// Run [`NonceManager::refresh_if_idle`] on every known signer.
    /// Returns how many persisted values were bumped.
    pub async fn refresh_idle(&self, idle_threshold: Duration) -> usize {
        let managers: Vec<Arc<NonceManager>> =
            self.managers.iter().map(|m| Arc::clone(m.value())).collect();
        let mut bumped = 0;
        for manager in managers {
            match manager.refresh_if_idle(idle_threshold).await {
                Ok(true) => bumped += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    chain = %manager.chain,
                    signer = %manager.signer,
                    error = %e,
                    "idle nonce refresh failed"
                ),
            }
        }
        bumped
    }

    /// Spawn the periodic idle refresh until `shutdown` fires.
    pub fn spawn_auto_update(
        self: &Arc<Self>,
        interval: Duration,
        idle_threshold: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("nonce auto-update shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let bumped = this.refresh_idle(idle_threshold).await;
                        if bumped > 0 {
                            tracing::debug!(bumped, "nonce auto-update tick");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maker_store::StoreError;
    use maker_types::Timestamp;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct MemNonceStore {
        records: std::sync::Mutex<HashMap<(ChainId, Address), NonceRecord>>,
    }

    impl NonceStore for MemNonceStore {
        fn get_nonce(&self, chain: &ChainId, signer: &Address) -> Result<Option<NonceRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(chain.clone(), signer.clone()))
                .copied())
        }

        fn put_nonce(&self, chain: &ChainId, signer: &Address, record: &NonceRecord) -> Result<(), StoreError> {
            self.records
                .lock()
                .unwrap()
                .insert((chain.clone(), signer.clone()), *record);
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedSource {
        nonce: AtomicU64,
        fail: AtomicBool,
    }

    #[async_trait]
    impl NonceSource for ScriptedSource {
        async fn network_nonce(&self, _chain: &ChainId, _signer: &Address) -> Result<u64, NonceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NonceError::Refresh("rpc down".to_string()));
            }
            Ok(self.nonce.load(Ordering::SeqCst))
        }
    }

    struct TestClock(AtomicU64);

    impl Clock for TestClock {
        fn now(&self) -> Timestamp {
            Timestamp::from_millis(self.0.load(Ordering::SeqCst))
        }
    }

    struct Harness {
        store: Arc<MemNonceStore>,
        source: Arc<ScriptedSource>,
        clock: Arc<TestClock>,
        leases: NonceLeaseStore,
        chain: ChainId,
        signer: Address,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemNonceStore::default());
            let clock = Arc::new(TestClock(AtomicU64::new(1_000_000)));
            Self {
                leases: NonceLeaseStore::new(store.clone(), clock.clone()),
                store,
                source: Arc::new(ScriptedSource::default()),
                clock,
                chain: ChainId::new("1"),
                signer: Address::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            }
        }

        fn manager(&self) -> Arc<NonceManager> {
            self.leases
                .manager(&self.chain, &self.signer, self.source.clone())
        }

        fn persisted(&self) -> Option<NonceRecord> {
            self.store.get_nonce(&self.chain, &self.signer).unwrap()
        }
    }

    #[tokio::test]
    async fn submit_cycles_yield_consecutive_nonces() {
        let h = Harness::new();
        h.source.nonce.store(5, Ordering::SeqCst);
        let manager = h.manager();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let lease = manager.get_next_nonce().await.unwrap();
            seen.push(lease.nonce());
            lease.submit().unwrap();
        }
        assert_eq!(seen, vec![5, 6, 7, 8]);
        assert_eq!(h.persisted().unwrap().nonce, 9);
    }

    #[tokio::test]
    async fn rollback_restores_the_leased_nonce() {
        let h = Harness::new();
        let manager = h.manager();
        manager.get_next_nonce().await.unwrap().submit().unwrap();

        let lease = manager.get_next_nonce().await.unwrap();
        assert_eq!(lease.nonce(), 1);
        lease.rollback().unwrap();
        assert_eq!(h.persisted().unwrap().nonce, 1);

        let again = manager.get_next_nonce().await.unwrap();
        assert_eq!(again.nonce(), 1);
        again.submit().unwrap();
    }

    #[tokio::test]
    async fn network_ahead_of_persisted_wins() {
        let h = Harness::new();
        let manager = h.manager();
        manager.get_next_nonce().await.unwrap().submit().unwrap();
        h.source.nonce.store(10, Ordering::SeqCst);
        let lease = manager.get_next_nonce().await.unwrap();
        assert_eq!(lease.nonce(), 10);
        lease.submit().unwrap();
        assert_eq!(h.persisted().unwrap().nonce, 11);
    }

    #[tokio::test]
    async fn failed_refresh_releases_without_mutation() {
        let h = Harness::new();
        let manager = h.manager();
        manager.get_next_nonce().await.unwrap().submit().unwrap();
        let before = h.persisted();

        h.source.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.get_next_nonce().await,
            Err(NonceError::Refresh(_))
        ));
        assert_eq!(h.persisted(), before);

        h.source.fail.store(false, Ordering::SeqCst);
        let lease = tokio::time::timeout(Duration::from_secs(1), manager.get_next_nonce())
            .await
            .expect("mutex must have been released")
            .unwrap();
        assert_eq!(lease.nonce(), 1);
        lease.submit().unwrap();
    }

    #[tokio::test]
    async fn dropped_lease_releases_without_persisting() {
        let h = Harness::new();
        let manager = h.manager();
        manager.get_next_nonce().await.unwrap().submit().unwrap();
        drop(manager.get_next_nonce().await.unwrap());
        assert_eq!(h.persisted().unwrap().nonce, 1);
        let lease = manager.get_next_nonce().await.unwrap();
        assert_eq!(lease.nonce(), 1);
        lease.submit().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_leases_never_overlap() {
        let h = Harness::new();
        let manager = h.manager();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                let lease = manager.get_next_nonce().await.unwrap();
                let nonce = lease.nonce();
                tokio::task::yield_now().await;
                lease.submit().unwrap();
                nonce
            }));
        }
        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, (0..16).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn second_lease_waits_for_the_first() {
        let h = Harness::new();
        let manager = h.manager();
        let first = manager.get_next_nonce().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), manager.get_next_nonce()).await;
        assert!(blocked.is_err());
        first.submit().unwrap();
        let second = manager.get_next_nonce().await.unwrap();
        assert_eq!(second.nonce(), 1);
        second.submit().unwrap();
    }

    #[tokio::test]
    async fn idle_refresh_bumps_only_after_threshold() {
        let h = Harness::new();
        let manager = h.manager();
        manager.get_next_nonce().await.unwrap().submit().unwrap();
        h.source.nonce.store(4, Ordering::SeqCst);

        let idle = Duration::from_secs(300);
        assert!(!manager.refresh_if_idle(idle).await.unwrap());
        assert_eq!(h.persisted().unwrap().nonce, 1);

        h.clock.0.fetch_add(301_000, Ordering::SeqCst);
        assert_eq!(h.leases.refresh_idle(idle).await, 1);
        assert_eq!(h.persisted().unwrap().nonce, 4);
    }

    #[tokio::test]
    async fn idle_refresh_skips_while_leased() {
        let h = Harness::new();
        let manager = h.manager();
        manager.get_next_nonce().await.unwrap().submit().unwrap();
        h.clock.0.fetch_add(600_000, Ordering::SeqCst);
        h.source.nonce.store(9, Ordering::SeqCst);

        let lease = manager.get_next_nonce().await.unwrap();
        assert!(!manager.refresh_if_idle(Duration::from_secs(300)).await.unwrap());
        lease.rollback().unwrap();
    }

    #[tokio::test]
    async fn auto_update_stops_on_shutdown() {
        let h = Harness::new();
        let leases = Arc::new(h.leases);
        let (tx, rx) = broadcast::channel(1);
        let handle = leases.spawn_auto_update(
            Duration::from_millis(10),
            Duration::from_secs(300),
            rx,
        );
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    proptest! {
        /// Any interleaving of submits and rollbacks leaves the persisted
        /// nonce at the number of submits.
        #[test]
        fn persisted_nonce_counts_submits(ops in prop::collection::vec(any::<bool>(), 1..30)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let submits = rt.block_on(async {
                let h = Harness::new();
                let manager = h.manager();
                let mut expected = 0u64;
                for submit in &ops {
                    let lease = manager.get_next_nonce().await.unwrap();
                    assert_eq!(lease.nonce(), expected);
                    if *submit {
                        lease.submit().unwrap();
                        expected += 1;
                    } else {
                        lease.rollback().unwrap();
                    }
                }
                assert_eq!(h.persisted().unwrap().nonce, expected);
                expected
            });
            prop_assert_eq!(submits, ops.iter().filter(|s| **s).count() as u64);
        }
    }
}
