//! Nullable store: thread-safe in-memory storage for testing.

use std::collections::HashMap;
use std::sync::Mutex;

use maker_store::{NonceRecord, NonceStore, SerialStore, StoreError};
use maker_types::{Address, ChainId};

/// An in-memory serial log for testing.
///
/// `fail_writes_after(n)` lets the next `n` batch writes succeed and fails
/// every one after that, for exercising compensation paths.
#[derive(Default)]
pub struct NullSerialStore {
    serials: Mutex<HashMap<(ChainId, String), String>>,
    writes_left: Mutex<Option<usize>>,
}

impl NullSerialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_after(&self, successes: usize) {
        *self.writes_left.lock().unwrap() = Some(successes);
    }

    pub fn allow_writes(&self) {
        *self.writes_left.lock().unwrap() = None;
    }

    pub fn len(&self) -> usize {
        self.serials.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SerialStore for NullSerialStore {
    fn get_serial(&self, chain: &ChainId, source_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .serials
            .lock()
            .unwrap()
            .get(&(chain.clone(), source_id.to_string()))
            .cloned())
    }

    fn put_serials(&self, chain: &ChainId, entries: &[(String, String)]) -> Result<(), StoreError> {
        {
            let mut left = self.writes_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => return Err(StoreError::Unavailable("serial writes disabled".into())),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        let mut serials = self.serials.lock().unwrap();
        for (source_id, outcome) in entries {
            serials.insert((chain.clone(), source_id.clone()), outcome.clone());
        }
        Ok(())
    }

    fn delete_serials(&self, chain: &ChainId, source_ids: &[String]) -> Result<(), StoreError> {
        let mut serials = self.serials.lock().unwrap();
        for source_id in source_ids {
            serials.remove(&(chain.clone(), source_id.clone()));
        }
        Ok(())
    }
}

/// An in-memory nonce store for testing.
#[derive(Default)]
pub struct NullNonceStore {
    nonces: Mutex<HashMap<(ChainId, Address), NonceRecord>>,
}

impl NullNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceStore for NullNonceStore {
    fn get_nonce(&self, chain: &ChainId, signer: &Address) -> Result<Option<NonceRecord>, StoreError> {
        Ok(self
            .nonces
            .lock()
            .unwrap()
            .get(&(chain.clone(), signer.clone()))
            .copied())
    }

    fn put_nonce(&self, chain: &ChainId, signer: &Address, record: &NonceRecord) -> Result<(), StoreError> {
        self.nonces
            .lock()
            .unwrap()
            .insert((chain.clone(), signer.clone()), *record);
        Ok(())
    }
}
