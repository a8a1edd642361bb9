//! External collaborator contracts. The core depends only on these traits; concrete
//! implementations (CSV stores, the SQLite sink) live in [`crate::store`] and
//! [`crate::sink`] as ambient, swappable adapters.

use chrono::{DateTime, Utc};

use crate::error::{DataSourceError, SinkError};
use crate::params::StrategyParams;
use crate::signal::{SignalBatch, SignalFilter};
use crate::trade::TradeOutcome;
use crate::types::Candle;

/// Read-only source of ordered, deduplicated candle history for one pair and timeframe.
///
/// `Sync` so the Session Runner can fetch multiple pairs' histories concurrently via `rayon`
/// during prefetch (spec §5: I/O is read once into an in-memory map before the wave loop;
/// nothing stops those reads from happening in parallel with each other).
pub trait CandleStore: Sync {
    fn candles(
        &self,
        trading_pair_id: u32,
        timeframe: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataSourceError>;
}

/// Read-only source of signals matching the full eligibility predicate. Returns a
/// [`SignalBatch`] rather than a bare `Vec<Signal>` so the source's own rejections
/// (`filter_score`, `filter_hour`, `filter_exchange`, `filter_liquidity`) reach the session
/// summary instead of being silently discarded at the source boundary.
pub trait SignalSource {
    fn signals(&self, filter: &SignalFilter) -> Result<SignalBatch, DataSourceError>;
}

/// Resolves the best `StrategyParams` for an exchange (spec §4.5).
pub trait ParamsSource {
    fn best_params(&self, exchange_id: u32) -> Result<StrategyParams, DataSourceError>;
}

/// Durable or in-memory destination for trade rows and the session summary. Both
/// operations are idempotent on `session_id`.
pub trait ResultSink {
    fn append_trade(&mut self, session_id: &str, trade: &TradeOutcome) -> Result<(), SinkError>;

    /// `user_id` identifies the caller that requested the session (spec §6's
    /// `run_session(session_id, user_id, strategy_overrides)`); the core never branches on
    /// it, but the sink persists it so the excluded presentation/CRUD layer can scope
    /// results per user.
    fn write_summary(
        &mut self,
        session_id: &str,
        user_id: &str,
        summary: &crate::session::SessionSummary,
        params: &StrategyParams,
    ) -> Result<(), SinkError>;
}

/// Observes long-running prefetch work. A no-op by default; the CLI shell wires an
/// `indicatif` bar into it. Purely observational — never gates control flow.
pub trait ProgressReporter {
    fn set_total(&mut self, total: u64);
    fn inc(&mut self, delta: u64);
    fn finish(&mut self);
}

/// The default, silent reporter used whenever the caller doesn't care about progress.
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {
    fn set_total(&mut self, _total: u64) {}
    fn inc(&mut self, _delta: u64) {}
    fn finish(&mut self) {}
}
