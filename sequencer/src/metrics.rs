//! Prometheus metrics for the settlement sequencer.
//!
//! [`SequencerMetrics`] owns a dedicated [`Registry`] so the embedding
//! process can encode it into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct SequencerMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Orders validated and queued by ingestion.
    pub orders_ingested: IntCounter,
    /// Orders removed permanently (expired, failed re-validation, record mismatch).
    pub orders_dropped: IntCounter,
    /// Orders returned to the pool after a recoverable failure.
    pub orders_requeued: IntCounter,
    /// Orders whose payout was broadcast.
    pub orders_settled: IntCounter,
    /// Orders marked failed after a terminal send error.
    pub orders_failed: IntCounter,
    /// Aggregate multi-recipient transfers sent.
    pub batches_sent: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Orders currently queued across all pool keys.
    pub pool_size: IntGauge,
    /// Deposits indexed in the settlement ledgers awaiting payout.
    pub ledger_backlog: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Duration of one `execute` pass, in milliseconds.
    pub execute_time_ms: Histogram,
}

impl SequencerMetrics {
    /// Create a fresh set of metrics, all registered under a new [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_ingested = register_int_counter_with_registry!(
            Opts::new("maker_orders_ingested_total", "Orders queued by ingestion"),
            registry
        )
        .expect("failed to register orders_ingested counter");

        let orders_dropped = register_int_counter_with_registry!(
            Opts::new("maker_orders_dropped_total", "Orders dropped permanently"),
            registry
        )
        .expect("failed to register orders_dropped counter");

        let orders_requeued = register_int_counter_with_registry!(
            Opts::new(
                "maker_orders_requeued_total",
                "Orders returned to the pool after a recoverable failure"
            ),
            registry
        )
        .expect("failed to register orders_requeued counter");

        let orders_settled = register_int_counter_with_registry!(
            Opts::new("maker_orders_settled_total", "Orders paid out"),
            registry
        )
        .expect("failed to register orders_settled counter");

        let orders_failed = register_int_counter_with_registry!(
            Opts::new(
                "maker_orders_failed_total",
                "Orders marked failed after a terminal send error"
            ),
            registry
        )
        .expect("failed to register orders_failed counter");

        let batches_sent = register_int_counter_with_registry!(
            Opts::new("maker_batches_sent_total", "Aggregate transfers sent"),
            registry
        )
        .expect("failed to register batches_sent counter");

        let pool_size = register_int_gauge_with_registry!(
            Opts::new("maker_pool_size", "Orders currently queued"),
            registry
        )
        .expect("failed to register pool_size gauge");

        let ledger_backlog = register_int_gauge_with_registry!(
            Opts::new("maker_ledger_backlog", "Deposits indexed awaiting payout"),
            registry
        )
        .expect("failed to register ledger_backlog gauge");

        // 1 ms → ~32 s
        let execute_time_ms = register_histogram_with_registry!(
            HistogramOpts::new("maker_execute_time_ms", "Execute pass duration in milliseconds")
                .buckets(vec![
                    1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0,
                    4096.0, 8192.0, 16384.0, 32768.0,
                ]),
            registry
        )
        .expect("failed to register execute_time_ms histogram");

        Self {
            registry,
            orders_ingested,
            orders_dropped,
            orders_requeued,
            orders_settled,
            orders_failed,
            batches_sent,
            pool_size,
            ledger_backlog,
            execute_time_ms,
        }
    }

    /// Encode every metric in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for SequencerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
