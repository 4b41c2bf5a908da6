//! ATR trail engine — indicator, signals, and replay backtesting
//!
//! Provides:
//! - Streaming Wilder ATR and the EMA / ATR trailing-stop "trail" indicator
//! - Trail cross-over signal detection with execution delay and noise filters
//! - Leveraged entry lifecycle with PnL / ROE extrema tracking
//! - Step-wise replay and batch backtesting with aggregate statistics
//! - Normalization of exchange klines into validated candles

pub mod atr;
pub mod engine;
pub mod entry;
pub mod error;
pub mod normalize;
pub mod pnl;
pub mod signals;
pub mod statistics;
pub mod trail;
pub mod types;

// Re-exports for convenience
pub use atr::{AtrEngine, AtrOutput};
pub use engine::{BacktestEngine, BacktestReport, Replay, ReplayStep};
pub use entry::{Entry, EntryStatus};
pub use error::{EngineError, EngineResult};
pub use normalize::{normalize_klines, sanitize_candles, Normalized};
pub use pnl::{CapitalModel, Extrema};
pub use signals::{DetectorConfig, Signal, SignalDetector};
pub use statistics::{BacktestStatistics, EntrySummary};
pub use trail::TrailIndicator;
pub use types::*;
