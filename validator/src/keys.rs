//! Signer key lookup.

use std::sync::Arc;

use dashmap::DashMap;
use maker_types::{Address, PrivateKey};

/// Private keys by signer address.
///
/// Keys are loaded from the environment variable named by the lower-cased
/// signer address, or inserted directly.
#[derive(Default)]
pub struct KeyStore {
    keys: DashMap<Address, Arc<PrivateKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the keys of `signers` from the process environment.
    ///
    /// Missing or malformed entries are logged and skipped.
    pub fn from_env<'a>(signers: impl IntoIterator<Item = &'a Address>) -> Self {
        let store = Self::new();
        for signer in signers {
            match std::env::var(signer.as_str()) {
                Ok(raw) => match PrivateKey::from_hex(&raw) {
                    Ok(key) => store.insert(signer.clone(), key),
                    Err(e) => tracing::warn!(signer = %signer, error = %e, "malformed signer key"),
                },
                Err(_) => tracing::warn!(signer = %signer, "no private key in environment"),
            }
        }
        store
    }

    pub fn insert(&self, signer: Address, key: PrivateKey) {
        self.keys.insert(signer, Arc::new(key));
    }

    pub fn get(&self, signer: &Address) -> Option<Arc<PrivateKey>> {
        self.keys.get(signer).map(|k| Arc::clone(k.value()))
    }

    pub fn contains(&self, signer: &Address) -> bool {
        self.keys.contains_key(signer)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let keys = KeyStore::new();
        let signer = Address::parse("0x0a").unwrap();
        assert!(!keys.contains(&signer));
        keys.insert(signer.clone(), PrivateKey::from_hex("0x01").unwrap());
        assert!(keys.contains(&signer));
        assert_eq!(keys.get(&signer).unwrap().as_bytes(), &[1]);
    }

    #[test]
    fn from_env_skips_missing_signers() {
        let signer = Address::parse("0x00000000000000000000000000000000000f00d1").unwrap();
        let keys = KeyStore::from_env([&signer]);
        assert!(keys.is_empty());
    }
}
