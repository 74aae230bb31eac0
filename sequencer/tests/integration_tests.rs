//! Integration tests exercising the full settlement pipeline:
//! deposit record → ingestion → pool → claim → payout → settlement record.
//!
//! These tests wire the sequencer to the nullable chain and deposit
//! repository and to a real LMDB serial log, verifying the claim and
//! payout paths end-to-end.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use maker_account::AccountRegistry;
use maker_ledger::CLAIM_MARKER;
use maker_nonce::NonceLeaseStore;
use maker_nullables::{
    NullAccountFactory, NullChain, NullClock, NullDepositRepository, NullFailure, NullNonceStore,
};
use maker_sequencer::{PushOutcome, Sequencer, SequencerContext, SequencerError, SequencerMetrics};
use maker_store::{DepositFilter, DepositRepository, SettlementRecord, StoreError};
use maker_store_lmdb::LmdbEnvironment;
use maker_types::{
    Address, ChainFamily, ChainId, ChainInfo, ChainRegistry, ChainSettings, DepositStatus,
    PoolKey, PrivateKey, SourceRoute, Timestamp, Token, TransferAmountTransaction,
};
use maker_validator::{KeyStore, RateTable, Validator};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const NOW: u64 = 1_700_000_000_000;

fn addr(n: u8) -> Address {
    Address::parse(&format!("0x{:040x}", n)).expect("valid address")
}

fn usdt() -> Address {
    addr(0x11)
}

fn maker() -> Address {
    addr(0xaa)
}

fn target() -> ChainId {
    ChainId::new("10")
}

fn pool_key() -> PoolKey {
    PoolKey::new(target(), maker(), "USDT")
}

fn token(symbol: &str, address: Address, decimals: u32) -> Token {
    Token {
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        address,
        decimals,
        is_native: false,
    }
}

fn chain(id: &str) -> ChainInfo {
    ChainInfo {
        chain_id: ChainId::new(id),
        name: format!("chain-{id}"),
        family: ChainFamily::Evm,
        native_currency: Token {
            is_native: true,
            ..token("ETH", Address::zero(), 18)
        },
        tokens: vec![token("USDT", usdt(), 6)],
        router: Some(addr(0xee)),
    }
}

fn deposit(id: u64, hash: &str, amount: &str) -> TransferAmountTransaction {
    TransferAmountTransaction {
        transaction_id: id,
        source_id: hash.to_string(),
        source_chain: ChainId::new("1"),
        source_token: usdt(),
        source_symbol: "USDT".to_string(),
        source_amount: Decimal::from_str(amount).expect("decimal"),
        source_nonce: id.to_string(),
        source_time: Timestamp::from_millis(NOW - 60_000),
        source_address: addr(0x50),
        source_maker: maker(),
        target_chain: target(),
        target_token: usdt(),
        target_symbol: "USDT".to_string(),
        target_amount: Decimal::from_str(amount).expect("decimal"),
        target_address: addr(0x50 + id as u8),
        target_maker: maker(),
        response_maker: Vec::new(),
        route: SourceRoute::CrossAddress,
        status: DepositStatus::Pending,
        target_id: None,
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    sequencer: Arc<Sequencer>,
    repository: Arc<NullDepositRepository>,
    chain: Arc<NullChain>,
    clock: Arc<NullClock>,
    metrics: Arc<SequencerMetrics>,
}

impl Harness {
    fn status(&self, id: u64) -> Option<DepositStatus> {
        self.repository.status(id)
    }

    fn fund(&self, value: u128) {
        self.chain.set_balance(&target(), &maker(), &usdt(), value);
    }

    async fn queue(&self, id: u64, hash: &str, amount: &str) {
        let tx = deposit(id, hash, amount);
        self.repository.insert(tx.clone());
        let outcome = self.sequencer.push(tx).await.expect("push");
        assert_eq!(outcome, PushOutcome::Queued);
    }
}

async fn harness(settings: ChainSettings) -> Harness {
    harness_with(settings, |repo| repo as Arc<dyn DepositRepository>).await
}

async fn harness_with(
    settings: ChainSettings,
    wrap: impl FnOnce(Arc<NullDepositRepository>) -> Arc<dyn DepositRepository>,
) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let env = LmdbEnvironment::open(dir.path(), 64 * 1024 * 1024).expect("open env");
    let serials = Arc::new(env.serial_store());

    let clock = Arc::new(NullClock::new(NOW));
    let mut chain_settings = HashMap::new();
    chain_settings.insert(target(), settings);
    let registry =
        Arc::new(ChainRegistry::new(vec![chain("1"), chain("10")]).with_settings(chain_settings));

    let rates = Arc::new(RateTable::new(Duration::from_secs(3600), clock.clone()));
    rates.set_usd_price("USDT", Decimal::ONE).await;
    rates.set_usd_price("ETH", Decimal::from(2000)).await;

    let keys = Arc::new(KeyStore::new());
    keys.insert(maker(), PrivateKey::from_hex("0x01").expect("key"));

    let chain_state = Arc::new(NullChain::new());
    let nonces = Arc::new(NonceLeaseStore::new(
        Arc::new(NullNonceStore::new()),
        clock.clone(),
    ));
    let accounts = Arc::new(
        AccountRegistry::new(nonces)
            .with_factory(Arc::new(NullAccountFactory::new(chain_state.clone()))),
    );

    let null_repository = Arc::new(NullDepositRepository::new());
    let repository = wrap(null_repository.clone());
    let validator = Arc::new(Validator::new(
        registry.clone(),
        rates,
        keys,
        accounts,
        repository.clone(),
        serials.clone(),
        clock.clone(),
    ));
    let metrics = Arc::new(SequencerMetrics::new());
    let sequencer = Arc::new(Sequencer::new(
        vec![maker()],
        SequencerContext {
            registry,
            validator,
            repository,
            serials,
            clock: clock.clone(),
            metrics: metrics.clone(),
        },
    ));

    Harness {
        _dir: dir,
        sequencer,
        repository: null_repository,
        chain: chain_state,
        clock,
        metrics,
    }
}

fn batching(count: usize) -> ChainSettings {
    ChainSettings {
        batch_transfer_count: count,
        ..ChainSettings::default()
    }
}

/// Moves one deposit to processing right before the sequencer's own claim,
/// as a concurrent worker would.
struct RacingRepository {
    inner: Arc<NullDepositRepository>,
    steal: Mutex<Option<u64>>,
}

#[async_trait]
impl DepositRepository for RacingRepository {
    async fn find_pending_deposits(
        &self,
        filter: &DepositFilter,
    ) -> Result<Vec<TransferAmountTransaction>, StoreError> {
        self.inner.find_pending_deposits(filter).await
    }

    async fn find_deposit(
        &self,
        transaction_id: u64,
    ) -> Result<Option<TransferAmountTransaction>, StoreError> {
        self.inner.find_deposit(transaction_id).await
    }

    async fn update_status(
        &self,
        ids: &[u64],
        expected: DepositStatus,
        new: DepositStatus,
    ) -> Result<Vec<u64>, StoreError> {
        if expected == DepositStatus::Pending && new == DepositStatus::Processing {
            let stolen = self.steal.lock().unwrap().take();
            if let Some(id) = stolen {
                self.inner.set_status(id, DepositStatus::Processing);
            }
        }
        self.inner.update_status(ids, expected, new).await
    }

    async fn record_settlement(
        &self,
        transaction_id: u64,
        settlement: &SettlementRecord,
    ) -> Result<(), StoreError> {
        self.inner.record_settlement(transaction_id, settlement).await
    }

    async fn settlement_exists(&self, source_id: &str) -> Result<bool, StoreError> {
        self.inner.settlement_exists(source_id).await
    }
}

// ---------------------------------------------------------------------------
// 1. Single payout end-to-end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ingested_deposit_is_paid_once_and_settled() {
    let h = harness(ChainSettings::default()).await;
    h.fund(1_000_000_000);
    h.repository.insert(deposit(1, "0xABC", "100"));

    assert_eq!(h.sequencer.ingest_tick().await, 1);
    assert_eq!(h.sequencer.pool().len(&pool_key()), 1);

    h.clock.advance(6_000);
    let handles = h.sequencer.monitor_tick();
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.expect("execute task");
    }
    h.sequencer.flush_settlements().await;

    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![addr(0x51)]);
    assert_eq!(sent[0].values, vec![100_000_000]);
    assert_eq!(sent[0].serial_ids, vec!["0xabc".to_string()]);

    assert_eq!(h.status(1), Some(DepositStatus::Settled));
    let record = h.repository.get(1).expect("deposit");
    assert_eq!(record.target_id.as_deref(), Some(sent[0].hash.as_str()));
    let settlements = h.repository.settlements();
    assert_eq!(settlements[0].1.target_fee, Some(21_000));

    let ledger = h.sequencer.ledger(&target());
    assert_eq!(
        ledger.serial_record("0xabc").expect("serial read"),
        Some(sent[0].hash.clone())
    );
    assert!(h.sequencer.pool().is_empty());
    assert_eq!(h.metrics.orders_settled.get(), 1);
}

#[tokio::test]
async fn monitor_skips_domain_until_interval_elapses() {
    let h = harness(ChainSettings::default()).await;
    h.fund(1_000_000_000);
    h.queue(1, "0x01", "10").await;
    for handle in h.sequencer.monitor_tick() {
        handle.await.expect("execute task");
    }
    assert_eq!(h.chain.sent().len(), 1);

    h.queue(2, "0x02", "10").await;
    assert!(h.sequencer.monitor_tick().is_empty());

    h.clock.advance(5_001);
    let handles = h.sequencer.monitor_tick();
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.expect("execute task");
    }
    assert_eq!(h.chain.sent().len(), 2);
}

// ---------------------------------------------------------------------------
// 2. Duplicate ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_ingestion_queues_one_entry() {
    let h = harness(ChainSettings::default()).await;
    let tx = deposit(1, "0xABC", "100");
    h.repository.insert(tx.clone());

    assert_eq!(h.sequencer.ingest_tick().await, 1);
    assert_eq!(h.sequencer.ingest_tick().await, 0);
    assert_eq!(
        h.sequencer.push(tx).await.expect("push"),
        PushOutcome::Exists
    );
    assert_eq!(h.sequencer.pool().total(), 1);
    assert_eq!(h.metrics.orders_ingested.get(), 1);
}

#[tokio::test]
async fn claimed_deposit_is_not_queued_again() {
    let h = harness(ChainSettings::default()).await;
    let tx = deposit(1, "0x01", "10");
    h.repository.insert(tx.clone());
    h.sequencer
        .ledger(&target())
        .set_serial_outcome(&[("0x01".to_string(), CLAIM_MARKER.to_string())])
        .expect("serial write");

    assert!(matches!(
        h.sequencer.push(tx).await,
        Err(SequencerError::Validation(_))
    ));
    assert!(h.sequencer.pool().is_empty());
}

// ---------------------------------------------------------------------------
// 3. Insufficient balance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn underfunded_signer_makes_no_chain_call() {
    let h = harness(ChainSettings::default()).await;
    h.fund(10_000_000);
    h.queue(1, "0x01", "50").await;

    let result = h.sequencer.execute(&pool_key()).await;
    assert!(matches!(result, Err(SequencerError::NoSender(_))));

    assert!(h.chain.sent().is_empty());
    assert_eq!(h.status(1), Some(DepositStatus::Pending));
    assert_eq!(h.sequencer.pool().len(&pool_key()), 1);
    assert_eq!(h.metrics.orders_requeued.get(), 1);
}

// ---------------------------------------------------------------------------
// 4. Batch payout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_batch_is_one_aggregate_transfer() {
    let h = harness(batching(3)).await;
    h.fund(1_000_000_000);
    for id in 1..=3 {
        h.queue(id, &format!("0x0{id}"), "10").await;
    }

    let response = h
        .sequencer
        .execute(&pool_key())
        .await
        .expect("execute")
        .expect("a payout");
    h.sequencer.flush_settlements().await;

    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients.len(), 3);
    assert_eq!(sent[0].values, vec![10_000_000; 3]);

    let ledger = h.sequencer.ledger(&target());
    for (i, id) in (1..=3u64).enumerate() {
        let expected = format!("{}#{}", response.hash, i);
        assert_eq!(h.status(id), Some(DepositStatus::Settled));
        assert_eq!(
            h.repository.get(id).expect("deposit").target_id,
            Some(expected.clone())
        );
        assert_eq!(
            ledger.serial_record(&format!("0x0{id}")).expect("serial read"),
            Some(expected)
        );
    }
    assert_eq!(h.metrics.batches_sent.get(), 1);
    assert!(h.sequencer.pool().is_empty());
}

#[tokio::test]
async fn lost_batch_claim_reverts_every_row() {
    let h = harness_with(batching(3), |inner| {
        Arc::new(RacingRepository {
            inner,
            steal: Mutex::new(Some(2)),
        }) as Arc<dyn DepositRepository>
    })
    .await;
    h.fund(1_000_000_000);
    for id in 1..=3 {
        h.queue(id, &format!("0x0{id}"), "10").await;
    }

    let result = h.sequencer.execute(&pool_key()).await;
    assert!(matches!(
        result,
        Err(SequencerError::ClaimLost {
            expected: 3,
            claimed: 2
        })
    ));

    assert!(h.chain.sent().is_empty());
    assert_eq!(h.status(1), Some(DepositStatus::Pending));
    assert_eq!(h.status(2), Some(DepositStatus::Processing));
    assert_eq!(h.status(3), Some(DepositStatus::Pending));
    assert_eq!(h.sequencer.pool().len(&pool_key()), 3);
    assert_eq!(
        h.sequencer.ledger(&target()).serial_record("0x01").expect("serial read"),
        None
    );
}

#[tokio::test]
async fn batch_defers_orders_for_another_token() {
    let h = harness(batching(3)).await;
    h.fund(1_000_000_000);
    for id in 1..=3 {
        h.queue(id, &format!("0x0{id}"), "10").await;
    }
    let mut orders = h.sequencer.pool().take(&pool_key());
    orders[2].token = addr(0x12);

    let outcome = h.sequencer.execute_transfer_multiple(orders).await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.selected.len(), 2);
    assert_eq!(outcome.deferred.len(), 1);
    assert_eq!(outcome.deferred[0].hash, "0x03");

    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![addr(0x51), addr(0x52)]);
    assert_eq!(h.status(3), Some(DepositStatus::Pending));
}

#[tokio::test]
async fn short_batch_pays_singly() {
    let h = harness(batching(3)).await;
    h.fund(1_000_000_000);
    h.queue(1, "0x01", "10").await;
    h.queue(2, "0x02", "10").await;

    h.sequencer.execute(&pool_key()).await.expect("execute");
    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![addr(0x51)]);
    assert_eq!(h.sequencer.pool().len(&pool_key()), 1);
}

#[tokio::test]
async fn batch_left_with_one_funded_order_pays_it_singly() {
    let h = harness(batching(3)).await;
    h.fund(15_000_000);
    for id in 1..=3 {
        h.queue(id, &format!("0x0{id}"), "10").await;
    }

    let response = h
        .sequencer
        .execute(&pool_key())
        .await
        .expect("execute")
        .expect("a payout");
    h.sequencer.flush_settlements().await;

    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![addr(0x51)]);
    assert_eq!(
        h.repository.get(1).expect("deposit").target_id,
        Some(response.hash.clone())
    );
    assert_eq!(
        h.sequencer.ledger(&target()).serial_record("0x01").expect("serial read"),
        Some(response.hash)
    );
    assert_eq!(h.metrics.batches_sent.get(), 0);

    assert_eq!(h.status(2), Some(DepositStatus::Pending));
    assert_eq!(h.status(3), Some(DepositStatus::Pending));
    assert_eq!(h.sequencer.pool().len(&pool_key()), 2);
}

// ---------------------------------------------------------------------------
// 5. Lock domain serialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_executes_never_share_a_nonce() {
    let h = harness(ChainSettings::default()).await;
    h.fund(1_000_000_000);
    h.queue(1, "0x01", "10").await;
    h.queue(2, "0x02", "10").await;
    h.chain.set_send_delay(Duration::from_millis(50));

    let first = {
        let sequencer = h.sequencer.clone();
        tokio::spawn(async move { sequencer.execute(&pool_key()).await })
    };
    let second = {
        let sequencer = h.sequencer.clone();
        tokio::spawn(async move { sequencer.execute(&pool_key()).await })
    };
    first.await.expect("join").expect("first execute");
    second.await.expect("join").expect("second execute");

    let sent = h.chain.sent();
    assert_eq!(sent.len(), 2);
    let mut nonces: Vec<u64> = sent.iter().map(|s| s.nonce).collect();
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1]);
    assert!(h.sequencer.pool().is_empty());

    h.sequencer.flush_settlements().await;
    assert_eq!(h.status(1), Some(DepositStatus::Settled));
    assert_eq!(h.status(2), Some(DepositStatus::Settled));
}

// ---------------------------------------------------------------------------
// 6. Send failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preflight_failure_reverts_claim_and_nonce() {
    let h = harness(ChainSettings::default()).await;
    h.fund(1_000_000_000);
    h.queue(1, "0x01", "10").await;
    h.chain.fail_next(NullFailure::Preflight);

    let result = h.sequencer.execute(&pool_key()).await;
    assert!(matches!(result, Err(SequencerError::Preflight(_))));
    assert_eq!(h.status(1), Some(DepositStatus::Pending));
    assert_eq!(
        h.sequencer.ledger(&target()).serial_record("0x01").expect("serial read"),
        None
    );
    assert_eq!(h.sequencer.pool().len(&pool_key()), 1);

    h.sequencer.execute(&pool_key()).await.expect("retry");
    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].nonce, 0);
}

#[tokio::test]
async fn broadcast_failure_marks_deposit_failed() {
    let h = harness(ChainSettings::default()).await;
    h.fund(1_000_000_000);
    h.queue(1, "0x01", "10").await;
    h.chain.fail_next(NullFailure::Broadcast);

    let result = h.sequencer.execute(&pool_key()).await;
    assert!(matches!(result, Err(SequencerError::Send(_))));
    assert_eq!(h.status(1), Some(DepositStatus::Failed));
    assert_eq!(
        h.sequencer.ledger(&target()).serial_record("0x01").expect("serial read"),
        Some(CLAIM_MARKER.to_string())
    );
    assert!(h.sequencer.pool().is_empty());
    assert_eq!(h.metrics.orders_failed.get(), 1);
}

#[tokio::test]
async fn expired_order_is_dropped_before_payout() {
    let h = harness(ChainSettings::default()).await;
    h.fund(1_000_000_000);
    h.queue(1, "0x01", "10").await;
    h.clock.advance(24 * 60 * 60 * 1000);

    let result = h.sequencer.execute(&pool_key()).await.expect("execute");
    assert!(result.is_none());
    assert!(h.chain.sent().is_empty());
    assert!(h.sequencer.pool().is_empty());
    assert_eq!(h.status(1), Some(DepositStatus::Pending));
    assert_eq!(h.metrics.orders_dropped.get(), 1);
    assert_eq!(
        h.sequencer.ledger(&target()).pending_count(&usdt()).await,
        0
    );
}

#[tokio::test]
async fn batch_preflight_failure_reverts_every_row() {
    let h = harness(batching(3)).await;
    h.fund(1_000_000_000);
    for id in 1..=3 {
        h.queue(id, &format!("0x0{id}"), "10").await;
    }
    h.chain.fail_next(NullFailure::Preflight);

    let result = h.sequencer.execute(&pool_key()).await;
    assert!(matches!(result, Err(SequencerError::Preflight(_))));
    assert!(h.chain.sent().is_empty());

    let ledger = h.sequencer.ledger(&target());
    for id in 1..=3u64 {
        assert_eq!(h.status(id), Some(DepositStatus::Pending));
        assert_eq!(
            ledger.serial_record(&format!("0x0{id}")).expect("serial read"),
            None
        );
    }
    assert_eq!(h.sequencer.pool().len(&pool_key()), 3);
    assert_eq!(ledger.pending_count(&usdt()).await, 3);
    assert_eq!(h.metrics.orders_requeued.get(), 3);
}

#[tokio::test]
async fn batch_broadcast_failure_marks_every_row_failed() {
    let h = harness(batching(3)).await;
    h.fund(1_000_000_000);
    for id in 1..=3 {
        h.queue(id, &format!("0x0{id}"), "10").await;
    }
    h.chain.fail_next(NullFailure::Broadcast);

    let result = h.sequencer.execute(&pool_key()).await;
    assert!(matches!(result, Err(SequencerError::Send(_))));

    let ledger = h.sequencer.ledger(&target());
    for id in 1..=3u64 {
        assert_eq!(h.status(id), Some(DepositStatus::Failed));
        assert_eq!(
            ledger.serial_record(&format!("0x0{id}")).expect("serial read"),
            Some(CLAIM_MARKER.to_string())
        );
    }
    assert!(h.sequencer.pool().is_empty());
    assert_eq!(h.metrics.orders_failed.get(), 3);
}

// ---------------------------------------------------------------------------
// 7. Dropped orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropped_deposit_is_not_ingested_again() {
    let h = harness(ChainSettings::default()).await;
    h.fund(1_000_000_000);
    // Pays out twice the deposit's value, above the 150% risk limit.
    let mut tx = deposit(1, "0x01", "10");
    tx.target_amount = Decimal::from(20);
    h.repository.insert(tx.clone());

    assert_eq!(h.sequencer.ingest_tick().await, 1);
    let result = h.sequencer.execute(&pool_key()).await.expect("execute");
    assert!(result.is_none());
    assert_eq!(h.metrics.orders_dropped.get(), 1);
    assert_eq!(h.status(1), Some(DepositStatus::Pending));

    assert_eq!(h.sequencer.ingest_tick().await, 0);
    assert!(h.sequencer.pool().is_empty());
    assert_eq!(
        h.sequencer.push(tx).await.expect("push"),
        PushOutcome::Dropped
    );

    h.clock.advance(1_000);
    h.sequencer.execute(&pool_key()).await.expect("execute");
    assert!(h.chain.sent().is_empty());
    assert_eq!(h.metrics.orders_dropped.get(), 1);
}
