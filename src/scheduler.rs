//! Wave Scheduler: bins signals into 15-minute cohorts and drives admission, closure, and
//! equity tracking across the session.

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use ordered_float::OrderedFloat;

use crate::cancellation::CancellationToken;
use crate::error::SkipReason;
use crate::ledger::{LedgerState, PriceBook};
use crate::params::StrategyParams;
use crate::signal::Signal;
use crate::simulator::{self, cap_loss_to_margin};
use crate::trade::{CloseReason, OpenPosition, TradeOutcome};
use crate::types::{Candle, Money, Symbol};

/// Rounds `t` down to the containing 15-minute wave boundary.
pub fn wave_key(t: DateTime<Utc>) -> DateTime<Utc> {
    let floored_minute = (t.minute() / 15) * 15;
    t.date_naive()
        .and_hms_opt(t.hour(), floored_minute, 0)
        .expect("valid wall-clock time")
        .and_utc()
}

/// Groups `signals` into ascending waves, each internally ordered by `score_week` desc,
/// `score_month` desc, `signal_id` asc (spec §4.4).
pub fn bucket_into_waves(mut signals: Vec<Signal>) -> Vec<(DateTime<Utc>, Vec<Signal>)> {
    signals.sort_by(|a, b| {
        wave_key(a.signal_timestamp)
            .cmp(&wave_key(b.signal_timestamp))
            .then(OrderedFloat(b.score_week).cmp(&OrderedFloat(a.score_week)))
            .then(OrderedFloat(b.score_month).cmp(&OrderedFloat(a.score_month)))
            .then(a.signal_id.cmp(&b.signal_id))
    });

    let mut waves: Vec<(DateTime<Utc>, Vec<Signal>)> = Vec::new();
    for signal in signals {
        let key = wave_key(signal.signal_timestamp);
        match waves.last_mut() {
            Some((last_key, bucket)) if *last_key == key => bucket.push(signal),
            _ => waves.push((key, vec![signal])),
        }
    }
    waves
}

/// A pair's candle history, keyed for O(1) lookup by the scheduler during the wave loop.
pub type CandleHistory = HashMap<Symbol, Vec<Candle>>;

/// Accumulated outcome of driving the scheduler across every wave plus finalization.
pub struct ScheduleResult {
    pub ledger: LedgerState,
    pub trades: Vec<TradeOutcome>,
    pub skips: HashMap<SkipReason, u64>,
}

fn record_skip(skips: &mut HashMap<SkipReason, u64>, reason: SkipReason) {
    *skips.entry(reason).or_insert(0) += 1;
}

/// Looks up the candle whose `close` represents the price at `wave_time`: the last candle
/// with `timestamp <= wave_time`.
fn price_at(history: &[Candle], wave_time: DateTime<Utc>) -> Option<f64> {
    history
        .iter()
        .rev()
        .find(|c| c.timestamp <= wave_time)
        .map(|c| c.close)
}

/// Drives the full wave loop from the earliest wave through `params.simulation_end_time`,
/// then finalizes any positions still open. `waves` must already be bucketed and ordered
/// (see [`bucket_into_waves`]).
///
/// `cancel` is polled between waves and between signals within a wave (spec §5). On
/// cancellation the loop stops admitting further signals and falls through to
/// finalization immediately, so every open position still closes via the forced-close path.
pub fn run_waves(
    waves: Vec<(DateTime<Utc>, Vec<Signal>)>,
    history: &CandleHistory,
    params: &StrategyParams,
    cancel: &CancellationToken,
) -> ScheduleResult {
    let mut ledger = LedgerState::new(Money::from_f64(params.initial_capital));
    let mut open_positions: HashMap<Symbol, OpenPosition> = HashMap::new();
    let mut trades: Vec<TradeOutcome> = Vec::new();
    let mut skips: HashMap<SkipReason, u64> = HashMap::new();

    'waves: for (wave_time, wave_signals) in &waves {
        if cancel.is_cancelled() {
            break;
        }
        let wave_time = *wave_time;

        // 1. Close due.
        let due: Vec<Symbol> = open_positions
            .iter()
            .filter(|(_, p)| p.projected_close_time <= wave_time)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        for symbol in due {
            let position = open_positions.remove(&symbol).expect("just filtered");
            ledger.release(
                position.margin,
                position.projected_net_pnl,
                position.entry_commission,
                position.projected_exit_commission,
            );
            trades.push(position.into_outcome());
        }

        // 2. Update equity.
        let symbols: Vec<Symbol> = open_positions.keys().cloned().collect();
        if let Some(prices) = PriceBook::build(symbols.iter(), |symbol| {
            history.get(symbol).and_then(|h| price_at(h, wave_time))
        }) {
            ledger.snapshot_equity(&open_positions, &prices, params.leverage);
        }
        ledger.observe_open_count(open_positions.len());

        // 3. Admit.
        let mut admitted_this_wave: u32 = 0;
        for signal in wave_signals {
            if cancel.is_cancelled() {
                break 'waves;
            }
            if admitted_this_wave >= params.max_trades_per_wave {
                record_skip(&mut skips, SkipReason::WaveCapReached);
                continue;
            }
            if open_positions.contains_key(&signal.pair_symbol) {
                record_skip(&mut skips, SkipReason::DuplicatePair);
                continue;
            }
            let margin = Money::from_f64(params.position_size);
            if ledger.try_reserve(margin).is_err() {
                record_skip(&mut skips, SkipReason::InsufficientCapital);
                continue;
            }

            let Some(pair_history) = history.get(&signal.pair_symbol) else {
                ledger.release(margin, Money::ZERO, Money::ZERO, Money::ZERO);
                record_skip(&mut skips, SkipReason::NoHistory);
                continue;
            };

            match simulator::simulate(signal, pair_history, params) {
                None => {
                    ledger.release(margin, Money::ZERO, Money::ZERO, Money::ZERO);
                    record_skip(&mut skips, SkipReason::NoEntry);
                }
                Some(projection) => {
                    let position = projection.into_open_position(signal.signal_id, signal.pair_symbol.clone());
                    if position.projected_close_time <= wave_time {
                        ledger.release(
                            position.margin,
                            position.projected_net_pnl,
                            position.entry_commission,
                            position.projected_exit_commission,
                        );
                        trades.push(position.into_outcome());
                    } else {
                        admitted_this_wave += 1;
                        open_positions.insert(position.pair_symbol.clone(), position);
                        ledger.observe_open_count(open_positions.len());
                    }
                }
            }
        }
    }

    finalize(&mut ledger, open_positions, history, params, &mut trades);

    ScheduleResult {
        ledger,
        trades,
        skips,
    }
}

/// Closes every position still open at `simulation_end_time`, relabeling to
/// `forced_liquidation` when the implied loss exceeds
/// `forced_close_max_loss_fraction * position_size` (spec §4.4).
fn finalize(
    ledger: &mut LedgerState,
    open_positions: HashMap<Symbol, OpenPosition>,
    history: &CandleHistory,
    params: &StrategyParams,
    trades: &mut Vec<TradeOutcome>,
) {
    let mut remaining: Vec<OpenPosition> = open_positions.into_values().collect();
    remaining.sort_by(|a, b| {
        a.projected_close_time
            .cmp(&b.projected_close_time)
            .then(a.pair_symbol.cmp(&b.pair_symbol))
    });

    for position in remaining {
        let last_price = history
            .get(&position.pair_symbol)
            .and_then(|h| price_at(h, params.simulation_end_time))
            .unwrap_or(position.entry_price);

        let margin = position.margin;
        let entry_commission = position.entry_commission;
        let effective_notional = params.effective_notional();
        let pnl_pct = position.direction.sign() * (last_price - position.entry_price) / position.entry_price * 100.0;
        let gross_pnl = Money::from_f64(effective_notional * pnl_pct / 100.0);
        let exit_commission = Money::from_f64(effective_notional * params.commission_rate);
        let net_raw = gross_pnl - entry_commission - exit_commission;

        // -(forced_close_max_loss_fraction * position_size / effective_notional * 100)
        let forced_loss_threshold =
            -(params.forced_close_max_loss_fraction * params.position_size / effective_notional * 100.0);
        let (close_reason, net_pnl) = if pnl_pct < forced_loss_threshold {
            (CloseReason::ForcedLiquidation, -(margin - entry_commission))
        } else {
            (
                CloseReason::ForcedPeriodEnd,
                cap_loss_to_margin(net_raw, margin, entry_commission),
            )
        };

        let outcome = position.with_final_close(
            params.simulation_end_time,
            last_price,
            close_reason,
            gross_pnl,
            exit_commission,
            net_pnl,
        );
        ledger.release(margin, net_pnl, entry_commission, exit_commission);
        trades.push(outcome);
    }
}
