//! Service assembly and lifecycle.
//!
//! [`MakerService`] owns the storage environment and every background loop:
//! deposit ingestion, the pool monitor, nonce auto-update and the exchange
//! rate fetcher. `start` spawns them, `stop` signals shutdown and waits.

use std::sync::Arc;

use maker_account::{AccountFactory, AccountRegistry};
use maker_nonce::NonceLeaseStore;
use maker_store::{DepositRepository, SerialStore, StoreError};
use maker_store_lmdb::{environment::DEFAULT_MAP_SIZE, LmdbEnvironment};
use maker_types::{ChainRegistry, Clock, SystemClock};
use maker_validator::{CoinbaseRateFetcher, KeyStore, RateTable, Validator};
use tokio::task::JoinHandle;

use crate::{
    Sequencer, SequencerConfig, SequencerContext, SequencerError, SequencerMetrics,
    ShutdownController,
};

/// Read the chain registry named by `config.chains_file`.
pub fn load_registry(config: &SequencerConfig) -> Result<ChainRegistry, SequencerError> {
    let content = std::fs::read_to_string(&config.chains_file).map_err(|e| {
        SequencerError::Config(format!(
            "failed to read {}: {e}",
            config.chains_file.display()
        ))
    })?;
    ChainRegistry::from_json_str(&content).map_err(|e| SequencerError::Config(e.to_string()))
}

pub struct MakerService {
    config: SequencerConfig,
    // Kept open for the lifetime of the service.
    _env: LmdbEnvironment,
    sequencer: Arc<Sequencer>,
    nonces: Arc<NonceLeaseStore>,
    fetcher: Arc<CoinbaseRateFetcher>,
    metrics: Arc<SequencerMetrics>,
    shutdown: Arc<ShutdownController>,
    task_handles: Vec<JoinHandle<()>>,
}

impl MakerService {
    /// Wire every component. Nothing runs until [`start`](Self::start).
    ///
    /// `config.chains` overrides the registry's per-chain settings. Signer
    /// keys are read from the environment for every address in
    /// `config.makers`.
    pub fn open(
        config: SequencerConfig,
        registry: ChainRegistry,
        repository: Arc<dyn DepositRepository>,
        factories: Vec<Arc<dyn AccountFactory>>,
    ) -> Result<Self, SequencerError> {
        let registry = Arc::new(registry.with_settings(config.chains.clone()));

        let env = LmdbEnvironment::open(&config.data_dir, DEFAULT_MAP_SIZE)
            .map_err(StoreError::from)?;
        let serials: Arc<dyn SerialStore> = Arc::new(env.serial_store());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let nonces = Arc::new(NonceLeaseStore::new(
            Arc::new(env.nonce_store()),
            Arc::clone(&clock),
        ));
        let keys = Arc::new(KeyStore::from_env(&config.makers));
        if keys.len() < config.makers.len() {
            tracing::warn!(
                makers = config.makers.len(),
                keys = keys.len(),
                "some makers have no private key configured"
            );
        }
        let accounts = Arc::new(
            factories
                .into_iter()
                .fold(AccountRegistry::new(Arc::clone(&nonces)), |accounts, f| {
                    accounts.with_factory(f)
                }),
        );

        let rates = Arc::new(RateTable::new(config.oracle_rate_ttl(), Arc::clone(&clock)));
        let fetcher = Arc::new(
            CoinbaseRateFetcher::new(
                Arc::clone(&rates),
                config.oracle_url.clone(),
                config.http_timeout(),
            )
            .map_err(|e| SequencerError::Config(e.to_string()))?,
        );

        let validator = Arc::new(
            Validator::new(
                Arc::clone(&registry),
                rates,
                keys,
                accounts,
                Arc::clone(&repository),
                Arc::clone(&serials),
                Arc::clone(&clock),
            )
            .with_blacklist(config.blacklist.iter().cloned()),
        );

        let metrics = Arc::new(SequencerMetrics::new());
        let sequencer = Arc::new(Sequencer::new(
            config.makers.clone(),
            SequencerContext {
                registry,
                validator,
                repository,
                serials,
                clock,
                metrics: Arc::clone(&metrics),
            },
        ));

        Ok(Self {
            config,
            _env: env,
            sequencer,
            nonces,
            fetcher,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            task_handles: Vec::new(),
        })
    }

    /// Spawn the background loops.
    pub fn start(&mut self) {
        tracing::info!(
            makers = self.config.makers.len(),
            data_dir = %self.config.data_dir.display(),
            "maker service starting"
        );

        let handle = Arc::clone(&self.fetcher).spawn(
            self.config.oracle_refresh_interval(),
            self.shutdown.subscribe(),
        );
        self.task_handles.push(handle);

        let handle = self.nonces.spawn_auto_update(
            self.config.nonce_refresh_interval(),
            self.config.nonce_idle_threshold(),
            self.shutdown.subscribe(),
        );
        self.task_handles.push(handle);

        let handle = self
            .sequencer
            .spawn_ingestion(self.config.ingest_interval(), self.shutdown.subscribe());
        self.task_handles.push(handle);

        let handle = self
            .sequencer
            .spawn_monitor(self.config.monitor_interval(), self.shutdown.subscribe());
        self.task_handles.push(handle);

        tracing::info!(tasks = self.task_handles.len(), "maker service started");
    }

    /// Signal shutdown and wait for every loop and pending settlement write.
    pub async fn stop(&mut self) {
        tracing::info!("maker service stopping");
        self.shutdown.shutdown();

        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task failed");
            }
        }
        self.sequencer.flush_settlements().await;

        tracing::info!("maker service stopped");
    }

    pub fn sequencer(&self) -> &Arc<Sequencer> {
        &self.sequencer
    }

    pub fn metrics(&self) -> &Arc<SequencerMetrics> {
        &self.metrics
    }

    /// Prometheus text encoding of every metric, or `None` when
    /// `enable_metrics` is off.
    pub fn metrics_text(&self) -> Result<Option<String>, SequencerError> {
        if !self.config.enable_metrics {
            return Ok(None);
        }
        Ok(Some(self.metrics.encode_text()?))
    }

    pub fn shutdown_controller(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }
}
