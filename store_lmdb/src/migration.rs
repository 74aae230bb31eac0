//! Schema versioning for the serial log and nonce databases.
//!
//! The version lives in the `meta` database. Serial and nonce keys are
//! `chain 0x00 id`; any change to that layout or to the bincode nonce
//! record bumps [`CURRENT_SCHEMA_VERSION`] and adds a step here.

use maker_store::MetaStore;

use crate::LmdbError;

/// Layout written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub struct Migrator;

impl Migrator {
    /// Bring the serial and nonce databases to [`CURRENT_SCHEMA_VERSION`].
    ///
    /// An environment without a stored version is new and is stamped
    /// directly. A version above the current one is refused, since a payout
    /// log in an unknown layout could hide settled deposits.
    pub fn run(meta_store: &impl MetaStore) -> Result<(), LmdbError> {
        let current = meta_store
            .get_schema_version()
            .map_err(|e| LmdbError::Schema(e.to_string()))?;

        if current == CURRENT_SCHEMA_VERSION {
            tracing::debug!(version = current, "serial log schema current");
            return Ok(());
        }

        if current > CURRENT_SCHEMA_VERSION {
            return Err(LmdbError::Schema(format!(
                "serial log schema {current} is newer than supported {CURRENT_SCHEMA_VERSION}"
            )));
        }

        for version in current..CURRENT_SCHEMA_VERSION {
            tracing::info!(from = version, to = version + 1, "upgrading serial log schema");
            upgrade(version, version + 1)?;
        }

        meta_store
            .set_schema_version(CURRENT_SCHEMA_VERSION)
            .map_err(|e| LmdbError::Schema(e.to_string()))?;

        tracing::info!(version = CURRENT_SCHEMA_VERSION, "serial log schema upgraded");
        Ok(())
    }
}

fn upgrade(from: u32, to: u32) -> Result<(), LmdbError> {
    match (from, to) {
        // Fresh environment; `open` already created every database.
        (0, 1) => Ok(()),
        _ => Err(LmdbError::Schema(format!(
            "no upgrade path from schema {from} to {to}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;

    #[test]
    fn rerun_on_current_schema_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 10 * 1024 * 1024).unwrap();
        let meta = env.meta_store();
        Migrator::run(&meta).unwrap();
        assert_eq!(meta.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn unknown_step_is_error() {
        assert!(upgrade(0, 1).is_ok());
        assert!(matches!(upgrade(7, 8), Err(LmdbError::Schema(_))));
    }

    #[test]
    fn newer_layout_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 10 * 1024 * 1024).unwrap();
        let meta = env.meta_store();
        meta.set_schema_version(CURRENT_SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(Migrator::run(&meta), Err(LmdbError::Schema(_))));
    }
}
