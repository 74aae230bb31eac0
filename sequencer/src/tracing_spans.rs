//! Pre-built [`tracing::Span`] constructors for settlement operations.
//!
//! Consistent span names and fields make it easy to follow one deposit
//! from ingestion to payout across log lines.

use maker_types::{Address, ChainId, PoolKey};
use tracing::{info_span, Span};

/// One `execute` pass over a pool key.
pub fn execute_span(pool: &PoolKey) -> Span {
    info_span!("execute", pool = %pool)
}

pub fn transfer_single_span(chain: &ChainId, hash: &str) -> Span {
    info_span!("transfer_single", chain = %chain, hash = %hash)
}

pub fn transfer_batch_span(chain: &ChainId, signer: &Address, count: usize) -> Span {
    info_span!("transfer_batch", chain = %chain, signer = %signer, count)
}

/// One ingestion query for a target chain.
pub fn ingest_span(chain: &ChainId) -> Span {
    info_span!("ingest", chain = %chain)
}
