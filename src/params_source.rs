//! Concrete [`ParamsSource`] implementations (spec §4.5): a fixed single-config source for
//! straightforward runs, and a best-of selector that mirrors the teacher's
//! `Optimizer`/grid-search workflow in `optimizer.rs` — evaluate every candidate parameter
//! set against historical performance, then pick by the two-stage rule in §4.5.

use crate::error::DataSourceError;
use crate::interfaces::ParamsSource;
use crate::params::StrategyParams;

/// A parameter candidate's historical backtest performance, as reported by an external
/// backtest-history collaborator (out of scope for the core per spec §1).
#[derive(Debug, Clone, Copy)]
pub struct HistoricalPerformance {
    pub total_pnl_usd: f64,
    pub win_rate: f64,
}

/// Returns every `StrategyParams` candidate considered for an exchange, each annotated with
/// its historical performance. An external collaborator — the core only consumes it through
/// [`BestOfParamsSource`].
pub trait BacktestHistorySource {
    fn candidates(
        &self,
        exchange_id: u32,
    ) -> Result<Vec<(StrategyParams, HistoricalPerformance)>, DataSourceError>;
}

/// Always returns the same `StrategyParams`, ignoring `exchange_id`. Used when a session is
/// configured with one fixed parameter set rather than resolved via backtest history.
#[derive(Debug, Clone)]
pub struct StaticParamsSource(pub StrategyParams);

impl ParamsSource for StaticParamsSource {
    fn best_params(&self, _exchange_id: u32) -> Result<StrategyParams, DataSourceError> {
        Ok(self.0.clone())
    }
}

/// Resolves the best `StrategyParams` per exchange by the rule in spec §4.5: among all
/// candidates, find the one maximizing `total_pnl_usd`; among those within 85% of that max,
/// pick the one with the highest `win_rate`.
pub struct BestOfParamsSource<H> {
    history: H,
}

impl<H: BacktestHistorySource> BestOfParamsSource<H> {
    pub fn new(history: H) -> Self {
        Self { history }
    }
}

impl<H: BacktestHistorySource> ParamsSource for BestOfParamsSource<H> {
    fn best_params(&self, exchange_id: u32) -> Result<StrategyParams, DataSourceError> {
        let candidates = self.history.candidates(exchange_id)?;
        select_best(candidates)
            .ok_or(DataSourceError::NoParamsForExchange(exchange_id))
    }
}

/// The pure selection rule, separated from the trait plumbing so it can be unit tested
/// without a `BacktestHistorySource` fixture.
fn select_best(
    candidates: Vec<(StrategyParams, HistoricalPerformance)>,
) -> Option<StrategyParams> {
    let max_pnl = candidates
        .iter()
        .map(|(_, perf)| perf.total_pnl_usd)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max_pnl.is_finite() {
        return None;
    }
    let threshold = if max_pnl >= 0.0 {
        max_pnl * 0.85
    } else {
        // For a negative max, "within 85% of the max" means no worse than a deeper loss.
        max_pnl / 0.85
    };
    candidates
        .into_iter()
        .filter(|(_, perf)| perf.total_pnl_usd >= threshold)
        .max_by(|(_, a), (_, b)| a.win_rate.total_cmp(&b.win_rate))
        .map(|(params, _)| params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn params_with(max_trades_per_wave: u32) -> StrategyParams {
        StrategyParams {
            position_size: 100.0,
            leverage: 10,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            use_trailing_stop: false,
            trailing_distance_pct: 2.0,
            trailing_activation_pct: 1.0,
            commission_rate: 0.0006,
            slippage_pct: 0.05,
            liquidation_threshold: 0.9,
            max_trades_per_wave,
            initial_capital: 1000.0,
            simulation_end_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            wave_interval_minutes: 15,
            phase1_hours: 24,
            breakeven_window_hours: 8,
            smart_loss_pct_per_hour: 0.5,
            forced_close_max_loss_fraction: 0.95,
        }
    }

    #[test]
    fn picks_max_win_rate_among_candidates_within_85_percent_of_max_pnl() {
        let candidates = vec![
            (
                params_with(1),
                HistoricalPerformance {
                    total_pnl_usd: 100.0,
                    win_rate: 40.0,
                },
            ),
            (
                params_with(2),
                HistoricalPerformance {
                    total_pnl_usd: 90.0, // within 85% of 100
                    win_rate: 70.0,
                },
            ),
            (
                params_with(3),
                HistoricalPerformance {
                    total_pnl_usd: 50.0, // below 85% of 100, excluded
                    win_rate: 99.0,
                },
            ),
        ];
        let best = select_best(candidates).unwrap();
        assert_eq!(best.max_trades_per_wave, 2);
    }

    #[test]
    fn single_candidate_is_always_selected() {
        let candidates = vec![(
            params_with(5),
            HistoricalPerformance {
                total_pnl_usd: -10.0,
                win_rate: 30.0,
            },
        )];
        let best = select_best(candidates).unwrap();
        assert_eq!(best.max_trades_per_wave, 5);
    }

    #[test]
    fn empty_candidates_yields_none() {
        assert!(select_best(vec![]).is_none());
    }
}
