//! Error taxonomy for the simulation engine.
//!
//! Only [`CoreError`] escapes [`crate::session::run_session`]; everything else that can go
//! wrong on a per-signal basis is represented as a [`SkipReason`] and counted in the
//! session summary rather than propagated as an error.

use thiserror::Error;

use crate::types::Symbol;

/// Unrecoverable upstream failure from a Candle Store, Signal Source, or Params Source.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("candle store failed for {pair} ({timeframe}): {message}")]
    CandleFetch {
        pair: Symbol,
        timeframe: String,
        message: String,
    },

    #[error("signal source failed: {0}")]
    SignalFetch(String),

    #[error("no parameter set available for exchange {0}")]
    NoParamsForExchange(u32),

    #[error("underlying I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Invalid [`crate::params::StrategyParams`], rejected before the wave loop starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("position_size must be positive, got {0}")]
    NonPositivePositionSize(f64),

    #[error("leverage must be >= 1, got {0}")]
    InvalidLeverage(i32),

    #[error("{field} must be non-negative, got {value}")]
    NegativePercent { field: &'static str, value: f64 },

    #[error("max_trades_per_wave must be >= 1, got {0}")]
    InvalidMaxTradesPerWave(u32),

    #[error("liquidation_threshold must be in (0, 1], got {0}")]
    InvalidLiquidationThreshold(f64),

    #[error("initial_capital must be positive, got {0}")]
    NonPositiveInitialCapital(f64),
}

/// Failure writing to a [`crate::interfaces::ResultSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to persist trade: {0}")]
    Persist(String),

    #[error("failed to persist session summary: {0}")]
    Summary(String),
}

/// The only error type that escapes `run_session`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Non-error, per-signal disposition. Counted in [`crate::session::SessionSummary`] rather
/// than surfaced as an error — signal rejection is an expected, routine outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    NoEntry,
    NoHistory,
    InsufficientCapital,
    DuplicatePair,
    WaveCapReached,
    FilterScore,
    FilterHour,
    FilterExchange,
    FilterLiquidity,
}

use serde::{Deserialize, Serialize};

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::NoEntry => "no_entry",
            SkipReason::NoHistory => "no_history",
            SkipReason::InsufficientCapital => "insufficient_capital",
            SkipReason::DuplicatePair => "duplicate_pair",
            SkipReason::WaveCapReached => "wave_cap_reached",
            SkipReason::FilterScore => "filter_score",
            SkipReason::FilterHour => "filter_hour",
            SkipReason::FilterExchange => "filter_exchange",
            SkipReason::FilterLiquidity => "filter_liquidity",
        };
        write!(f, "{s}")
    }
}
