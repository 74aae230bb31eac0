//! LMDB implementation of SerialStore.
//!
//! Key format: `chain_id ++ 0x00 ++ source_id`; value: the outcome marker
//! as UTF-8 bytes.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use maker_store::{SerialStore, StoreError};
use maker_types::ChainId;

use crate::{scoped_key, LmdbError};

pub struct LmdbSerialStore {
    pub(crate) env: Arc<Env>,
    pub(crate) serial_db: Database<Bytes, Bytes>,
}

impl SerialStore for LmdbSerialStore {
    fn get_serial(&self, chain: &ChainId, source_id: &str) -> Result<Option<String>, StoreError> {
        let key = scoped_key(chain.as_str(), source_id);
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.serial_db.get(&rtxn, &key).map_err(LmdbError::from)? {
            Some(bytes) => {
                let marker = String::from_utf8(bytes.to_vec())
                    .map_err(|e| StoreError::Corruption(format!("serial {source_id}: {e}")))?;
                Ok(Some(marker))
            }
            None => Ok(None),
        }
    }

    fn put_serials(&self, chain: &ChainId, entries: &[(String, String)]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for (source_id, outcome) in entries {
            let key = scoped_key(chain.as_str(), source_id);
            self.serial_db
                .put(&mut wtxn, &key, outcome.as_bytes())
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::debug!(chain = %chain, count = entries.len(), "serial records written");
        Ok(())
    }

    fn delete_serials(&self, chain: &ChainId, source_ids: &[String]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for source_id in source_ids {
            let key = scoped_key(chain.as_str(), source_id);
            self.serial_db
                .delete(&mut wtxn, &key)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
