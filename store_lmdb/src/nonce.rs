//! LMDB implementation of NonceStore.
//!
//! Key format: `chain_id ++ 0x00 ++ signer`; value: bincode-encoded
//! [`NonceRecord`].

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use maker_store::{NonceRecord, NonceStore, StoreError};
use maker_types::{Address, ChainId};

use crate::{scoped_key, LmdbError};

pub struct LmdbNonceStore {
    pub(crate) env: Arc<Env>,
    pub(crate) nonce_db: Database<Bytes, Bytes>,
}

impl NonceStore for LmdbNonceStore {
    fn get_nonce(&self, chain: &ChainId, signer: &Address) -> Result<Option<NonceRecord>, StoreError> {
        let key = scoped_key(chain.as_str(), signer.as_str());
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.nonce_db.get(&rtxn, &key).map_err(LmdbError::from)? {
            Some(bytes) => {
                let record: NonceRecord = bincode::deserialize(bytes).map_err(LmdbError::from)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put_nonce(&self, chain: &ChainId, signer: &Address, record: &NonceRecord) -> Result<(), StoreError> {
        let key = scoped_key(chain.as_str(), signer.as_str());
        let bytes = bincode::serialize(record).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.nonce_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
