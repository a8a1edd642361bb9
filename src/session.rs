//! Session Runner: the top-level `run_session` operation wiring the Candle Store, Signal
//! Source, Params Source, and Result Sink around the Wave Scheduler.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::error::{CoreError, DataSourceError, SkipReason};
use crate::interfaces::{CandleStore, ParamsSource, ProgressReporter, ResultSink, SignalSource};
use crate::params::StrategyParams;
use crate::scheduler::{bucket_into_waves, run_waves, CandleHistory};
use crate::types::{Money, Symbol};

const TIMEFRAME: &str = "5m";

/// Final ledger snapshot plus trade-level aggregates, persisted through the Result Sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub initial_capital: Money,
    pub final_equity: Money,
    pub realized_pnl: Money,
    pub commission_paid: Money,
    pub min_equity: Money,
    pub max_concurrent_positions: usize,
    pub max_drawdown_usd: Money,
    pub max_drawdown_pct: f64,
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub breakevens: u64,
    pub win_rate: f64,
    pub skipped: HashMap<SkipReason, u64>,
}

/// Per-exchange overrides supplied by the caller, merged over the `ParamsSource`'s answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyOverrides {
    pub position_size: Option<f64>,
    pub leverage: Option<i32>,
    pub max_trades_per_wave: Option<u32>,
}

impl StrategyOverrides {
    fn apply(&self, mut params: StrategyParams) -> StrategyParams {
        if let Some(v) = self.position_size {
            params.position_size = v;
        }
        if let Some(v) = self.leverage {
            params.leverage = v;
        }
        if let Some(v) = self.max_trades_per_wave {
            params.max_trades_per_wave = v;
        }
        params
    }
}

/// The session's declared signal window and exchange scope, resolved into a
/// [`crate::signal::SignalFilter`] by the caller before `run_session` is invoked.
pub struct SessionRequest<'a> {
    pub session_id: String,
    /// Caller identity (spec §6's `run_session(session_id, user_id, strategy_overrides)`).
    /// The core never branches on it; it's threaded through to the Result Sink so the
    /// excluded presentation/CRUD layer can scope persisted results per user.
    pub user_id: String,
    pub exchange_id: u32,
    pub filter: crate::signal::SignalFilter,
    pub window_from: DateTime<Utc>,
    pub window_to: DateTime<Utc>,
    pub overrides: StrategyOverrides,
    pub progress: &'a mut dyn ProgressReporter,
    /// Polled between waves and between signals within a wave (spec §5). Defaults to an
    /// always-uncancelled token via [`Default`] for callers that never need to cancel.
    pub cancel: CancellationToken,
}

/// Orchestrates one backtest session: resolves parameters, fetches signals and candle
/// histories, drives the Wave Scheduler to `simulation_end_time`, and persists the result.
pub fn run_session(
    request: SessionRequest<'_>,
    candle_store: &dyn CandleStore,
    signal_source: &dyn SignalSource,
    params_source: &dyn ParamsSource,
    sink: &mut dyn ResultSink,
) -> Result<SessionSummary, CoreError> {
    let SessionRequest {
        session_id,
        user_id,
        exchange_id,
        filter,
        window_from,
        window_to,
        overrides,
        progress,
        cancel,
    } = request;

    let params = overrides.apply(params_source.best_params(exchange_id)?);
    params.validate()?;

    let batch = signal_source.signals(&filter)?;
    let signals = batch.signals;
    info!(session_id = %session_id, signal_count = signals.len(), "fetched eligible signals");

    let mut skipped: HashMap<SkipReason, u64> = HashMap::new();
    for (reason, count) in batch.skipped {
        *skipped.entry(reason).or_insert(0) += count;
    }

    // Distinct pairs needing a history fetch, in first-seen order (for deterministic progress
    // reporting; fetch order has no effect on the resulting map).
    let mut unique_pairs: Vec<(Symbol, u32)> = Vec::new();
    for signal in &signals {
        if !unique_pairs.iter().any(|(sym, _)| *sym == signal.pair_symbol) {
            unique_pairs.push((signal.pair_symbol.clone(), signal.trading_pair_id));
        }
    }
    progress.set_total(unique_pairs.len() as u64);

    // Each pair's history is independent of every other — fetch them concurrently (spec §5:
    // the core stays single-threaded, but prefetch I/O outside the wave loop is free to
    // parallelize since CandleStore is pure and read-only).
    let fetched: Vec<(Symbol, Result<Vec<crate::types::Candle>, DataSourceError>)> = unique_pairs
        .par_iter()
        .map(|(pair_symbol, trading_pair_id)| {
            let result = candle_store.candles(
                *trading_pair_id,
                TIMEFRAME,
                window_from,
                params.simulation_end_time,
            );
            (pair_symbol.clone(), result)
        })
        .collect();
    progress.inc(fetched.len() as u64);
    progress.finish();

    let mut history: CandleHistory = HashMap::new();
    for (pair_symbol, result) in fetched {
        match result {
            Ok(candles) => {
                history.insert(pair_symbol, candles);
            }
            Err(DataSourceError::CandleFetch { .. }) => {
                warn!(pair = %pair_symbol, "history fetch failed, signals for this pair will be skipped");
            }
            Err(other) => return Err(CoreError::DataSource(other)),
        }
    }

    let mut usable_signals = Vec::with_capacity(signals.len());
    for signal in signals {
        if history.contains_key(&signal.pair_symbol) {
            usable_signals.push(signal);
        } else {
            *skipped.entry(SkipReason::NoHistory).or_insert(0) += 1;
        }
    }

    let waves = bucket_into_waves(usable_signals);
    debug!(wave_count = waves.len(), "bucketed signals into waves");

    let result = run_waves(waves, &history, &params, &cancel);
    for (reason, count) in result.skips {
        *skipped.entry(reason).or_insert(0) += count;
    }

    for trade in &result.trades {
        sink.append_trade(&session_id, trade)?;
    }

    // Finalization closes every position before returning, so equity is just available
    // capital: no open margin or floating PnL remains.
    let final_equity = result.ledger.available_capital;
    let wins = result.trades.iter().filter(|t| t.is_win()).count() as u64;
    let losses = result.trades.iter().filter(|t| t.is_loss()).count() as u64;
    let breakevens = result.trades.iter().filter(|t| t.is_breakeven()).count() as u64;
    let total_trades = result.trades.len() as u64;
    let win_rate = if total_trades == 0 {
        0.0
    } else {
        wins as f64 / total_trades as f64 * 100.0
    };

    let summary = SessionSummary {
        session_id: session_id.clone(),
        initial_capital: result.ledger.initial_capital,
        final_equity,
        realized_pnl: result.ledger.realized_pnl,
        commission_paid: result.ledger.commission_paid,
        min_equity: result.ledger.min_equity,
        max_concurrent_positions: result.ledger.max_concurrent_positions,
        max_drawdown_usd: result.ledger.max_drawdown_usd,
        max_drawdown_pct: result.ledger.max_drawdown_pct,
        total_trades,
        wins,
        losses,
        breakevens,
        win_rate,
        skipped,
    };

    sink.write_summary(&session_id, &user_id, &summary, &params)?;
    Ok(summary)
}
