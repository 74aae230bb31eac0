//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::{LmdbError, LmdbMetaStore, LmdbNonceStore, LmdbSerialStore, Migrator};

const SERIALS_DB: &str = "serials";
const NONCES_DB: &str = "nonces";
const META_DB: &str = "meta";
const MAX_DBS: u32 = 3;

/// Default map size: 1 GiB is far more than serial and nonce records need.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    serial_db: Database<Bytes, Bytes>,
    nonce_db: Database<Bytes, Bytes>,
    meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an environment at `path` and bring its schema up to date.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        let mut options = EnvOpenOptions::new();
        options.map_size(map_size).max_dbs(MAX_DBS);
        // SAFETY: the directory is owned by this process; no other handle to
        // the same environment is opened concurrently.
        let env = unsafe { options.open(path)? };

        let mut wtxn = env.write_txn()?;
        let serial_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(SERIALS_DB))?;
        let nonce_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(NONCES_DB))?;
        let meta_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(META_DB))?;
        wtxn.commit()?;

        let environment = Self {
            env: Arc::new(env),
            serial_db,
            nonce_db,
            meta_db,
        };
        Migrator::run(&environment.meta_store())?;
        tracing::info!(path = %path.display(), "opened LMDB environment");
        Ok(environment)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn serial_store(&self) -> LmdbSerialStore {
        LmdbSerialStore {
            env: Arc::clone(&self.env),
            serial_db: self.serial_db,
        }
    }

    pub fn nonce_store(&self) -> LmdbNonceStore {
        LmdbNonceStore {
            env: Arc::clone(&self.env),
            nonce_db: self.nonce_db,
        }
    }

    pub fn meta_store(&self) -> LmdbMetaStore {
        LmdbMetaStore {
            env: Arc::clone(&self.env),
            meta_db: self.meta_db,
        }
    }
}
