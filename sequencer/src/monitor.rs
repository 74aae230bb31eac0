//! Scheduling state per lock domain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use maker_types::{LockDomain, Timestamp};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Execution lock and last-submit stamp for one `(chain, signer)`.
pub struct MonitorState {
    lock: Arc<Mutex<()>>,
    last_submit: AtomicU64,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            last_submit: AtomicU64::new(Timestamp::EPOCH.as_millis()),
        }
    }

    /// Take the lock if nobody holds it.
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.lock).try_lock_owned().ok()
    }

    /// Wait for the lock.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lock).lock_owned().await
    }

    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub fn last_submit(&self) -> Timestamp {
        Timestamp::from_millis(self.last_submit.load(Ordering::SeqCst))
    }

    pub fn stamp(&self, now: Timestamp) {
        self.last_submit.store(now.as_millis(), Ordering::SeqCst);
    }

    /// More than `interval_ms` has passed since the last submit.
    pub fn is_due(&self, now: Timestamp, interval_ms: u64) -> bool {
        self.last_submit().elapsed_since(now) > interval_ms
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazily created [`MonitorState`]s, kept for the process lifetime.
#[derive(Default)]
pub struct MonitorRegistry {
    states: DashMap<LockDomain, Arc<MonitorState>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, domain: &LockDomain) -> Arc<MonitorState> {
        self.states
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(MonitorState::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maker_types::{Address, ChainId};

    #[test]
    fn due_only_after_interval() {
        let state = MonitorState::new();
        state.stamp(Timestamp::from_millis(10_000));
        assert!(!state.is_due(Timestamp::from_millis(15_000), 5_000));
        assert!(state.is_due(Timestamp::from_millis(15_001), 5_000));
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let state = MonitorState::new();
        let guard = state.try_acquire().unwrap();
        assert!(state.is_locked());
        assert!(state.try_acquire().is_none());
        drop(guard);
        assert!(!state.is_locked());
        let _guard = state.acquire().await;
    }

    #[test]
    fn registry_shares_state_per_domain() {
        let registry = MonitorRegistry::new();
        let domain = LockDomain::new(ChainId::new("1"), Address::parse("0x0a").unwrap());
        let a = registry.state(&domain);
        let b = registry.state(&domain);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
