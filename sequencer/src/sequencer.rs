//! Trade pool scheduling and payout execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use maker_account::{Account, AccountError, TransferResponse};
use maker_ledger::{AddOutcome, Compensation, SettlementLedger};
use maker_store::{DepositFilter, DepositRepository, SerialStore, SettlementRecord};
use maker_types::{
    to_raw, Address, ChainId, ChainRegistry, Clock, DepositStatus, PoolKey, SwapOrder,
    SwapOrderType, Timestamp, TransferAmountTransaction,
};
use maker_validator::{ValidationError, Validator};
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

use crate::monitor::MonitorRegistry;
use crate::pool::TradePool;
use crate::tracing_spans::{execute_span, ingest_span, transfer_batch_span, transfer_single_span};
use crate::{SequencerError, SequencerMetrics};

/// Shared collaborators of a [`Sequencer`].
pub struct SequencerContext {
    pub registry: Arc<ChainRegistry>,
    pub validator: Arc<Validator>,
    pub repository: Arc<dyn DepositRepository>,
    pub serials: Arc<dyn SerialStore>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<SequencerMetrics>,
}

/// Result of [`Sequencer::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Already queued; nothing changed.
    Exists,
    /// Claimed or paid before; never queued again.
    AlreadySettled,
    /// Dropped by an earlier execution pass; never queued again.
    Dropped,
}

/// What happened to the orders handed to [`Sequencer::execute_transfer_multiple`].
pub struct BatchOutcome {
    /// Orders claimed and sent (or attempted) in one aggregate transfer.
    pub selected: Vec<SwapOrder>,
    pub result: Result<TransferResponse, SequencerError>,
    /// Valid orders left out of this batch; they belong back in the pool.
    pub deferred: Vec<SwapOrder>,
    /// Orders whose deposit record no longer matches; dropped.
    pub rejected: Vec<(SwapOrder, ValidationError)>,
}

impl BatchOutcome {
    fn new() -> Self {
        Self {
            selected: Vec::new(),
            result: Err(SequencerError::EmptyBatch),
            deferred: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Drives deposits from ingestion to payout.
///
/// Orders queue in a [`TradePool`] under `(chain, signer, symbol)`. A monitor
/// tick executes every key whose interval elapsed, holding the `(chain,
/// signer)` lock for the whole pass so one signer never broadcasts twice at
/// once. A deposit is claimed through the repository's conditional
/// `pending -> processing` update before any chain interaction.
pub struct Sequencer {
    makers: Vec<Address>,
    registry: Arc<ChainRegistry>,
    validator: Arc<Validator>,
    repository: Arc<dyn DepositRepository>,
    serials: Arc<dyn SerialStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SequencerMetrics>,
    pool: TradePool,
    monitors: MonitorRegistry,
    ledgers: DashMap<ChainId, Arc<SettlementLedger>>,
    /// Source hashes dropped before payout, with their chain and source time.
    /// Held until the deposit leaves the collection window.
    dropped: DashMap<String, (ChainId, Timestamp)>,
    settlements: Mutex<JoinSet<()>>,
}

impl Sequencer {
    /// `makers` restricts ingestion to deposits those signers should pay;
    /// empty means any.
    pub fn new(makers: Vec<Address>, ctx: SequencerContext) -> Self {
        Self {
            makers,
            registry: ctx.registry,
            validator: ctx.validator,
            repository: ctx.repository,
            serials: ctx.serials,
            clock: ctx.clock,
            metrics: ctx.metrics,
            pool: TradePool::new(),
            monitors: MonitorRegistry::new(),
            ledgers: DashMap::new(),
            dropped: DashMap::new(),
            settlements: Mutex::new(JoinSet::new()),
        }
    }

    pub fn pool(&self) -> &TradePool {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<SequencerMetrics> {
        &self.metrics
    }

    /// The settlement ledger of `chain`, created on first use.
    pub fn ledger(&self, chain: &ChainId) -> Arc<SettlementLedger> {
        self.ledgers
            .entry(chain.clone())
            .or_insert_with(|| {
                Arc::new(SettlementLedger::new(chain.clone(), Arc::clone(&self.serials)))
            })
            .clone()
    }

    // ── Ingestion ──────────────────────────────────────────────────────

    /// Validate a deposit and queue its order.
    pub async fn push(
        &self,
        mut tx: TransferAmountTransaction,
    ) -> Result<PushOutcome, SequencerError> {
        tx.source_id = tx.source_id.to_ascii_lowercase();
        if self.dropped.contains_key(&tx.source_id) {
            tracing::debug!(hash = %tx.source_id, "transaction dropped earlier");
            return Ok(PushOutcome::Dropped);
        }
        if self.pool.contains_hash(&tx.source_id) {
            tracing::debug!(hash = %tx.source_id, "transaction exists");
            return Ok(PushOutcome::Exists);
        }

        let order = self.validator.verify_from_tx(&tx).await?;
        let ledger = self.ledger(&order.chain_id);
        match ledger.add_transaction(tx).await? {
            AddOutcome::Added => {}
            AddOutcome::Exists => {
                tracing::info!(hash = %order.hash, "transaction exists");
                return Ok(PushOutcome::Exists);
            }
            AddOutcome::AlreadySettled => return Ok(PushOutcome::AlreadySettled),
        }
        if !self.pool.push(order.clone()) {
            tracing::info!(hash = %order.hash, "transaction exists");
            return Ok(PushOutcome::Exists);
        }

        self.metrics.orders_ingested.inc();
        self.metrics.pool_size.set(self.pool.total() as i64);
        tracing::info!(
            hash = %order.hash,
            chain = %order.chain_id,
            signer = %order.from,
            symbol = %order.symbol,
            value = order.value,
            order_type = ?order.order_type,
            "order queued"
        );
        Ok(PushOutcome::Queued)
    }

    /// Pull collectible deposits for every auto-paying chain and queue them.
    /// Returns how many orders were newly queued.
    pub async fn ingest_tick(&self) -> usize {
        let now = self.clock.now();
        let chains: Vec<ChainId> = self.registry.chain_ids().cloned().collect();
        let mut queued = 0;

        for chain in chains {
            let settings = self.registry.settings(&chain);
            if !settings.auto_payment {
                continue;
            }
            let filter = DepositFilter {
                status: DepositStatus::Pending,
                target_chain: chain.clone(),
                source_time_after: now.saturating_sub_millis(settings.transfer_timeout_ms),
                makers: self.makers.clone(),
            };
            let span = ingest_span(&chain);
            let deposits = match self
                .repository
                .find_pending_deposits(&filter)
                .instrument(span.clone())
                .await
            {
                Ok(deposits) => deposits,
                Err(e) => {
                    tracing::warn!(parent: &span, error = %e, "failed to load pending deposits");
                    continue;
                }
            };

            for tx in deposits {
                let hash = tx.source_id.clone();
                match self.push(tx).instrument(span.clone()).await {
                    Ok(PushOutcome::Queued) => queued += 1,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::info!(parent: &span, hash = %hash, error = %e, "deposit not queued");
                    }
                }
            }
        }

        self.prune_dropped();
        self.update_backlog().await;
        queued
    }

    /// Forget drops whose deposits ingestion can no longer return.
    fn prune_dropped(&self) {
        self.dropped.retain(|_, (chain, source_time)| {
            self.validator.transaction_time_valid(chain, *source_time)
        });
    }

    async fn update_backlog(&self) {
        let ledgers: Vec<Arc<SettlementLedger>> =
            self.ledgers.iter().map(|l| Arc::clone(l.value())).collect();
        let mut backlog = 0;
        for ledger in ledgers {
            backlog += ledger
                .symbols_with_data()
                .await
                .iter()
                .map(|b| b.pending)
                .sum::<usize>();
        }
        self.metrics.ledger_backlog.set(backlog as i64);
    }

    // ── Scheduling ─────────────────────────────────────────────────────

    /// Start an execution for every pool key that is due and whose lock
    /// domain is idle. Busy domains are skipped until the next tick.
    pub fn monitor_tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let now = self.clock.now();
        let mut handles = Vec::new();

        for key in self.pool.keys() {
            let interval = self.registry.settings(&key.chain_id).transfer_interval_ms;
            let state = self.monitors.state(&key.lock_domain());
            if !state.is_due(now, interval) {
                continue;
            }
            let Some(guard) = state.try_acquire() else {
                tracing::debug!(pool = %key, "lock domain busy");
                continue;
            };
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                if let Err(e) = this.execute_locked(&key, guard).await {
                    tracing::debug!(pool = %key, error = %e, "execute finished with error");
                }
            }));
        }
        handles
    }

    /// Execute `key`, waiting for its lock domain if another pass holds it.
    pub async fn execute(&self, key: &PoolKey) -> Result<Option<TransferResponse>, SequencerError> {
        let guard = self.monitors.state(&key.lock_domain()).acquire().await;
        self.execute_locked(key, guard).await
    }

    async fn execute_locked(
        &self,
        key: &PoolKey,
        guard: OwnedMutexGuard<()>,
    ) -> Result<Option<TransferResponse>, SequencerError> {
        let started = Instant::now();
        let result = self.execute_pass(key).instrument(execute_span(key)).await;

        self.monitors.state(&key.lock_domain()).stamp(self.clock.now());
        drop(guard);

        self.metrics
            .execute_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        self.metrics.pool_size.set(self.pool.total() as i64);
        result
    }

    async fn execute_pass(&self, key: &PoolKey) -> Result<Option<TransferResponse>, SequencerError> {
        let taken = self.pool.take(key);
        if taken.is_empty() {
            return Ok(None);
        }
        let ledger = self.ledger(&key.chain_id);

        let mut survivors = Vec::with_capacity(taken.len());
        for mut order in taken.into_iter().rev() {
            if !self
                .validator
                .transaction_time_valid(&order.chain_id, order.calldata.timestamp)
            {
                self.drop_order(&ledger, &order, &"collection window elapsed")
                    .await;
                continue;
            }
            if order.order_type == SwapOrderType::CrossToken {
                match self.validator.cross_token_value(&order).await {
                    Ok(value) => order.value = value,
                    Err(e) => {
                        self.drop_order(&ledger, &order, &e).await;
                        continue;
                    }
                }
            }
            if let Err(e) = self.validator.verify_to_tx(&order).await {
                self.drop_order(&ledger, &order, &e).await;
                continue;
            }
            survivors.push(order);
        }
        survivors.reverse();
        if survivors.is_empty() {
            return Ok(None);
        }

        let settings = self.registry.settings(&key.chain_id);
        if settings.batching_enabled() && survivors.len() >= settings.batch_transfer_count {
            let rest = survivors.split_off(settings.batch_transfer_count);
            self.pool.restore(key, rest);

            let outcome = self.execute_transfer_multiple(survivors).await;
            self.pool.restore(key, outcome.deferred);
            for (order, reason) in outcome.rejected {
                self.drop_order(&ledger, &order, &reason).await;
            }
            match outcome.result {
                Ok(response) => Ok(Some(response)),
                Err(e) => Err(self.handle_failure(&ledger, key, outcome.selected, e).await),
            }
        } else {
            let order = survivors.remove(0);
            self.pool.restore(key, survivors);
            match self.execute_transfer_single(&order).await {
                Ok(response) => Ok(Some(response)),
                Err(e) => Err(self.handle_failure(&ledger, key, vec![order], e).await),
            }
        }
    }

    async fn drop_order(
        &self,
        ledger: &SettlementLedger,
        order: &SwapOrder,
        reason: &(dyn std::fmt::Display + Sync),
    ) {
        ledger.remove_transaction(&order.token, &order.hash).await;
        self.dropped.insert(
            order.hash.clone(),
            (order.chain_id.clone(), order.calldata.timestamp),
        );
        self.metrics.orders_dropped.inc();
        tracing::warn!(hash = %order.hash, chain = %order.chain_id, reason = %reason, "order dropped");
    }

    async fn handle_failure(
        &self,
        ledger: &SettlementLedger,
        key: &PoolKey,
        orders: Vec<SwapOrder>,
        err: SequencerError,
    ) -> SequencerError {
        if err.is_recoverable() {
            tracing::warn!(pool = %key, count = orders.len(), error = %err, "orders requeued");
            self.metrics.orders_requeued.inc_by(orders.len() as u64);
            self.pool.restore(key, orders);
            return err;
        }
        match &err {
            SequencerError::Validation(_) | SequencerError::EmptyBatch => {
                for order in &orders {
                    self.drop_order(ledger, order, &err).await;
                }
            }
            _ => {
                self.metrics.orders_failed.inc_by(orders.len() as u64);
                for order in &orders {
                    tracing::error!(
                        hash = %order.hash,
                        chain = %order.chain_id,
                        signer = %order.from,
                        error = %err,
                        "settlement failed, manual intervention required"
                    );
                }
            }
        }
        err
    }

    // ── Execution ──────────────────────────────────────────────────────

    /// Pay one order.
    pub async fn execute_transfer_single(
        &self,
        order: &SwapOrder,
    ) -> Result<TransferResponse, SequencerError> {
        self.transfer_single(order)
            .instrument(transfer_single_span(&order.chain_id, &order.hash))
            .await
    }

    async fn transfer_single(&self, order: &SwapOrder) -> Result<TransferResponse, SequencerError> {
        let ledger = self.ledger(&order.chain_id);
        let (account, claim) = ledger
            .run_exclusive(&order.from, self.prepare_single(&ledger, order))
            .await?;

        match self.send(account.as_ref(), order, std::slice::from_ref(order)).await {
            Ok(response) => {
                // The claim stands; its markers are overwritten with the outcome.
                drop(claim);
                self.record_success(&ledger, &[(order, response.hash.clone())], &response)
                    .await;
                Ok(response)
            }
            Err(e) => Err(self
                .handle_send_error(&ledger, &[order.deposit_id], claim, e)
                .await),
        }
    }

    async fn prepare_single(
        &self,
        ledger: &SettlementLedger,
        order: &SwapOrder,
    ) -> Result<(Arc<dyn Account>, Compensation), SequencerError> {
        let sender = self
            .validator
            .transaction_get_private_key(order, std::slice::from_ref(&order.from))
            .await
            .map_err(sender_error)?;
        self.verify_record(order).await?;

        self.claim(&[order.deposit_id]).await?;
        match ledger
            .remove_transactions_and_set_serial(&order.token, std::slice::from_ref(&order.hash))
            .await
        {
            Ok(claim) => Ok((sender.account, claim)),
            Err(e) => {
                self.revert(&[order.deposit_id], DepositStatus::Pending).await;
                Err(e.into())
            }
        }
    }

    /// Pay several orders of one `(chain, token, signer)` in one aggregate transfer.
    ///
    /// Orders that don't share the first order's chain, token and signer are
    /// deferred, never merged. Individual recipients failing inside the
    /// aggregate call are not observable here; the whole batch is tracked by
    /// its single transaction hash. When signer assignment leaves one payable
    /// order it is paid as a plain transfer under the bare hash.
    pub async fn execute_transfer_multiple(&self, orders: Vec<SwapOrder>) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();
        let Some(anchor) = orders.first().cloned() else {
            return outcome;
        };
        let span = transfer_batch_span(&anchor.chain_id, &anchor.from, orders.len());
        self.transfer_multiple(&anchor, orders, &mut outcome)
            .instrument(span)
            .await;
        outcome
    }

    async fn transfer_multiple(
        &self,
        anchor: &SwapOrder,
        orders: Vec<SwapOrder>,
        outcome: &mut BatchOutcome,
    ) {
        let (same, other): (Vec<SwapOrder>, Vec<SwapOrder>) = orders.into_iter().partition(|o| {
            o.chain_id == anchor.chain_id && o.token == anchor.token && o.from == anchor.from
        });
        for order in &other {
            tracing::warn!(hash = %order.hash, "order does not match batch, deferred");
        }
        outcome.deferred.extend(other);

        let ledger = self.ledger(&anchor.chain_id);
        let prepared = ledger
            .run_exclusive(
                &anchor.from,
                self.prepare_batch(&ledger, anchor, same, outcome),
            )
            .await;
        let (account, claim) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                outcome.result = Err(e);
                return;
            }
        };

        let ids: Vec<u64> = outcome.selected.iter().map(|o| o.deposit_id).collect();
        let sent = self.send(account.as_ref(), anchor, &outcome.selected).await;

        outcome.result = match sent {
            Ok(response) => {
                drop(claim);
                let settled: Vec<(&SwapOrder, String)> = match outcome.selected.as_slice() {
                    [order] => vec![(order, response.hash.clone())],
                    orders => orders
                        .iter()
                        .enumerate()
                        .map(|(i, order)| (order, format!("{}#{}", response.hash, i)))
                        .collect(),
                };
                self.record_success(&ledger, &settled, &response).await;
                if settled.len() > 1 {
                    self.metrics.batches_sent.inc();
                }
                Ok(response)
            }
            Err(e) => Err(self.handle_send_error(&ledger, &ids, claim, e).await),
        };
    }

    /// Pay `orders`, all of `anchor`'s chain and token. A single order goes out
    /// as a plain transfer, more as one aggregate call.
    async fn send(
        &self,
        account: &dyn Account,
        anchor: &SwapOrder,
        orders: &[SwapOrder],
    ) -> Result<TransferResponse, AccountError> {
        let request = account.payment_before(orders);
        let native = self.registry.is_native_token(&anchor.chain_id, &anchor.token);
        if let [order] = orders {
            return if native {
                account.transfer(&order.to, order.value, request).await
            } else {
                account
                    .transfer_token(&anchor.token, &order.to, order.value, request)
                    .await
            };
        }

        let to: Vec<Address> = orders.iter().map(|o| o.to.clone()).collect();
        let values: Vec<u128> = orders.iter().map(|o| o.value).collect();
        if native {
            account.transfers(&to, &values, request).await
        } else {
            account
                .transfer_tokens(&anchor.token, &to, &values, request)
                .await
        }
    }

    async fn prepare_batch(
        &self,
        ledger: &SettlementLedger,
        anchor: &SwapOrder,
        orders: Vec<SwapOrder>,
        outcome: &mut BatchOutcome,
    ) -> Result<(Arc<dyn Account>, Compensation), SequencerError> {
        let assignment = self.validator.transaction_get_private_keys(orders).await;
        for (order, reason) in assignment.rejected {
            match reason {
                ValidationError::InsufficientBalance { .. }
                | ValidationError::NoUsableSender { .. } => {
                    tracing::warn!(hash = %order.hash, reason = %reason, "order deferred");
                    outcome.deferred.push(order);
                }
                reason => outcome.rejected.push((order, reason)),
            }
        }

        let mut groups = assignment.groups.into_iter();
        let Some(group) = groups.next() else {
            return Err(SequencerError::EmptyBatch);
        };
        for extra in groups {
            outcome.deferred.extend(extra.orders);
        }

        for order in group.orders {
            match self.verify_record(&order).await {
                Ok(()) => outcome.selected.push(order),
                Err(SequencerError::Validation(reason)) => outcome.rejected.push((order, reason)),
                Err(e) => {
                    outcome.deferred.push(order);
                    outcome.deferred.append(&mut outcome.selected);
                    return Err(e);
                }
            }
        }
        if outcome.selected.is_empty() {
            return Err(SequencerError::EmptyBatch);
        }

        let ids: Vec<u64> = outcome.selected.iter().map(|o| o.deposit_id).collect();
        self.claim(&ids).await?;
        let hashes: Vec<String> = outcome.selected.iter().map(|o| o.hash.clone()).collect();
        match ledger
            .remove_transactions_and_set_serial(&anchor.token, &hashes)
            .await
        {
            Ok(claim) => Ok((group.account, claim)),
            Err(e) => {
                self.revert(&ids, DepositStatus::Pending).await;
                Err(e.into())
            }
        }
    }

    /// Re-read the deposit record and check it still backs `order`.
    async fn verify_record(&self, order: &SwapOrder) -> Result<(), SequencerError> {
        let mismatch = |field: &'static str| ValidationError::RecordMismatch {
            hash: order.hash.clone(),
            field,
        };
        let record = self
            .repository
            .find_deposit(order.deposit_id)
            .await?
            .ok_or_else(|| ValidationError::DepositMissing {
                hash: order.hash.clone(),
            })?;

        if record.target_chain != order.chain_id {
            return Err(mismatch("target_chain").into());
        }
        if !record.source_id.eq_ignore_ascii_case(&order.hash) {
            return Err(mismatch("source_id").into());
        }
        let source_token = self
            .registry
            .token_by_symbol(&order.calldata.source_chain, &order.calldata.source_symbol)
            .ok_or_else(|| ValidationError::UnknownToken {
                chain: order.calldata.source_chain.clone(),
                token: order.calldata.source_symbol.clone(),
            })?;
        let source_value =
            to_raw(record.source_amount, source_token.decimals).map_err(ValidationError::from)?;
        if source_value != order.calldata.source_value {
            return Err(mismatch("source_amount").into());
        }
        if record.target_maker != order.from && !record.response_maker.contains(&order.from) {
            return Err(mismatch("target_maker").into());
        }
        if !record.target_symbol.eq_ignore_ascii_case(&order.symbol) {
            return Err(mismatch("target_symbol").into());
        }
        if record.status != DepositStatus::Pending {
            return Err(ValidationError::StatusChanged {
                hash: order.hash.clone(),
                status: record.status,
            }
            .into());
        }
        Ok(())
    }

    /// Move every id `pending -> processing`, or none of them.
    async fn claim(&self, ids: &[u64]) -> Result<(), SequencerError> {
        let moved = self
            .repository
            .update_status(ids, DepositStatus::Pending, DepositStatus::Processing)
            .await?;
        if moved.len() != ids.len() {
            if !moved.is_empty() {
                self.revert(&moved, DepositStatus::Pending).await;
            }
            tracing::warn!(expected = ids.len(), claimed = moved.len(), "claim lost to a concurrent worker");
            return Err(SequencerError::ClaimLost {
                expected: ids.len(),
                claimed: moved.len(),
            });
        }
        Ok(())
    }

    /// Move claimed ids out of processing.
    async fn revert(&self, ids: &[u64], to: DepositStatus) {
        match self
            .repository
            .update_status(ids, DepositStatus::Processing, to)
            .await
        {
            Ok(moved) if moved.len() == ids.len() => {}
            Ok(moved) => tracing::error!(
                expected = ids.len(),
                moved = moved.len(),
                status = ?to,
                "status revert incomplete"
            ),
            Err(e) => tracing::error!(ids = ?ids, status = ?to, error = %e, "status revert failed"),
        }
    }

    async fn handle_send_error(
        &self,
        ledger: &SettlementLedger,
        ids: &[u64],
        claim: Compensation,
        err: AccountError,
    ) -> SequencerError {
        let err = SequencerError::from_account(err);
        if err.is_recoverable() {
            self.revert(ids, DepositStatus::Pending).await;
            if let Err(e) = ledger.compensate(claim).await {
                tracing::error!(error = %e, "failed to compensate claim");
            }
        } else {
            // May have reached the chain; the claim marker stays so it is never re-paid.
            let claimed = claim.into_source_ids();
            self.revert(ids, DepositStatus::Failed).await;
            tracing::error!(hashes = ?claimed, error = %err, "send failed after claim");
        }
        err
    }

    async fn record_success(
        &self,
        ledger: &SettlementLedger,
        settled: &[(&SwapOrder, String)],
        response: &TransferResponse,
    ) {
        let outcomes: Vec<(String, String)> = settled
            .iter()
            .map(|(order, target_id)| (order.hash.clone(), target_id.clone()))
            .collect();
        if let Err(e) = ledger.set_serial_outcome(&outcomes) {
            tracing::error!(tx = %response.hash, error = %e, "failed to record serial outcome");
        }

        let mut tasks = self.settlements.lock().await;
        for (order, target_id) in settled {
            let repository = Arc::clone(&self.repository);
            let deposit_id = order.deposit_id;
            let hash = order.hash.clone();
            let record = SettlementRecord {
                target_id: target_id.clone(),
                target_symbol: order.symbol.clone(),
                target_fee: response.fee,
            };
            tasks.spawn(async move {
                if let Err(e) = repository.record_settlement(deposit_id, &record).await {
                    tracing::error!(hash = %hash, target = %record.target_id, error = %e, "failed to record settlement");
                }
            });
            tracing::info!(hash = %order.hash, target = %target_id, signer = %response.from, "order settled");
        }
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "settlement task failed");
            }
        }
        self.metrics.orders_settled.inc_by(settled.len() as u64);
    }

    /// Wait for every outstanding best-effort settlement write.
    pub async fn flush_settlements(&self) {
        let mut tasks = self.settlements.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "settlement task failed");
            }
        }
    }

    // ── Loops ──────────────────────────────────────────────────────────

    /// Run [`ingest_tick`](Self::ingest_tick) every `interval` until shutdown.
    pub fn spawn_ingestion(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("ingestion loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let queued = this.ingest_tick().await;
                        if queued > 0 {
                            tracing::debug!(queued, "ingestion tick");
                        }
                    }
                }
            }
        })
    }

    /// Run [`monitor_tick`](Self::monitor_tick) every `interval` until
    /// shutdown, then wait for executions already in flight.
    pub fn spawn_monitor(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut running: Vec<JoinHandle<()>> = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!(in_flight = running.len(), "monitor loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        running.retain(|handle| !handle.is_finished());
                        running.extend(this.monitor_tick());
                    }
                }
            }
            for handle in running {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "execution task failed");
                }
            }
        })
    }
}

fn sender_error(err: ValidationError) -> SequencerError {
    match err {
        err @ ValidationError::NoUsableSender { .. } => SequencerError::NoSender(err),
        err => SequencerError::Validation(err),
    }
}
