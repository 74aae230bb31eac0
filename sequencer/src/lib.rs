//! Maker settlement sequencer: turns confirmed deposits into payouts.
//!
//! The sequencer is the coordinator that:
//! - Ingests pending deposits and validates them into swap orders
//! - Queues orders per `(chain, signer, symbol)` in the trade pool
//! - Executes due pools under a per-`(chain, signer)` lock
//! - Claims deposits through a conditional status update before paying
//! - Pays singly or in one aggregate transfer when batching is configured

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod sequencer;
pub mod service;
pub mod shutdown;
pub mod tracing_spans;

pub use config::SequencerConfig;
pub use error::SequencerError;
pub use logging::{init_logging, LogFormat};
pub use metrics::SequencerMetrics;
pub use monitor::{MonitorRegistry, MonitorState};
pub use pool::TradePool;
pub use sequencer::{BatchOutcome, PushOutcome, Sequencer, SequencerContext};
pub use service::{load_registry, MakerService};
pub use shutdown::ShutdownController;
