//! Position Simulator: walks one signal's candle history under the three-phase timeline
//! and produces a projected trade outcome.
//!
//! This module is a pure function over its inputs — no I/O, no shared state — so the Wave
//! Scheduler can call it freely from within its single-threaded wave loop.

use chrono::{DateTime, Duration, Utc};

use crate::params::StrategyParams;
use crate::signal::{Signal, SignalAction};
use crate::trade::{CloseReason, OpenPosition};
use crate::types::{Candle, Direction, Money};

/// The projected exit the simulator computed for an admitted signal, before the scheduler
/// decides whether it closes within the admitting wave or remains open.
#[derive(Debug, Clone)]
pub struct SimulatedEntry {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_commission: Money,
    pub margin: Money,
    pub direction: Direction,
    pub close_time: DateTime<Utc>,
    pub close_price: f64,
    pub close_reason: CloseReason,
    pub gross_pnl: Money,
    pub exit_commission: Money,
    pub net_pnl: Money,
    pub peak_favorable_price: f64,
    pub max_potential_net_pnl: Money,
}

impl SimulatedEntry {
    pub fn into_open_position(self, signal_id: u64, pair_symbol: crate::types::Symbol) -> OpenPosition {
        OpenPosition {
            signal_id,
            pair_symbol,
            direction: self.direction,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            entry_commission: self.entry_commission,
            margin: self.margin,
            projected_close_time: self.close_time,
            projected_close_price: self.close_price,
            projected_close_reason: self.close_reason,
            projected_gross_pnl: self.gross_pnl,
            projected_exit_commission: self.exit_commission,
            projected_net_pnl: self.net_pnl,
            peak_favorable_price: self.peak_favorable_price,
            max_potential_net_pnl: self.max_potential_net_pnl,
        }
    }
}

/// Caps a raw net PnL at `-(position_size - entry_commission)`. Applied once, at every exit
/// site, so the invariant `net_pnl >= max_loss` holds unconditionally (spec §8 invariant 1).
pub fn cap_loss_to_margin(net_pnl_raw: Money, position_size: Money, entry_commission: Money) -> Money {
    let max_loss = -(position_size - entry_commission);
    net_pnl_raw.max(max_loss)
}

fn direction_of(action: SignalAction) -> Direction {
    match action {
        SignalAction::Long => Direction::Long,
        SignalAction::Short => Direction::Short,
    }
}

/// Worsens `price` against the position by `slippage_pct`, on the side that hurts: lower
/// for a LONG exit (a sell), higher for a SHORT exit (a buy-to-cover).
fn apply_slippage(price: f64, direction: Direction, slippage_pct: f64) -> f64 {
    match direction {
        Direction::Long => price * (1.0 - slippage_pct / 100.0),
        Direction::Short => price * (1.0 + slippage_pct / 100.0),
    }
}

/// `(gross_pnl, exit_commission, net_pnl)` for closing at `exit_price`.
fn settle(
    direction: Direction,
    entry_price: f64,
    exit_price: f64,
    effective_notional: f64,
    commission_rate: f64,
    entry_commission: Money,
    position_size: Money,
) -> (Money, Money, Money) {
    let pct = direction.sign() * (exit_price - entry_price) / entry_price * 100.0;
    let gross_pnl = Money::from_f64(effective_notional * pct / 100.0);
    let exit_commission = Money::from_f64(effective_notional * commission_rate);
    let net_raw = gross_pnl - entry_commission - exit_commission;
    let net_pnl = cap_loss_to_margin(net_raw, position_size, entry_commission);
    (gross_pnl, exit_commission, net_pnl)
}

enum Phase {
    ActiveRisk,
    Breakeven,
    SmartLoss,
}

fn phase_at(
    timestamp: DateTime<Utc>,
    t_phase1_end: DateTime<Utc>,
    t_breakeven_end: DateTime<Utc>,
) -> Phase {
    if timestamp <= t_phase1_end {
        Phase::ActiveRisk
    } else if timestamp <= t_breakeven_end {
        Phase::Breakeven
    } else {
        Phase::SmartLoss
    }
}

/// Simulates one signal against its candle history. Returns `None` ("no_entry") if no
/// candle at or after `signal.signal_timestamp` exists at or before
/// `params.simulation_end_time`. `candles` must be the pair's full 5-minute history,
/// ascending by timestamp; the caller is not required to pre-trim it to the signal window.
pub fn simulate(signal: &Signal, candles: &[Candle], params: &StrategyParams) -> Option<SimulatedEntry> {
    let entry_idx = candles
        .iter()
        .position(|c| c.timestamp >= signal.signal_timestamp && c.timestamp <= params.simulation_end_time)?;

    let direction = direction_of(signal.signal_action);
    let entry_time = signal.signal_timestamp;
    let entry_price = candles[entry_idx].open;
    let effective_notional = params.effective_notional();
    let entry_commission = Money::from_f64(effective_notional * params.commission_rate);
    let margin = Money::from_f64(params.position_size);
    let leverage = params.leverage as f64;

    let sl_price = match direction {
        Direction::Long => entry_price * (1.0 - params.stop_loss_pct / 100.0),
        Direction::Short => entry_price * (1.0 + params.stop_loss_pct / 100.0),
    };
    let tp_price = match direction {
        Direction::Long => entry_price * (1.0 + params.take_profit_pct / 100.0),
        Direction::Short => entry_price * (1.0 - params.take_profit_pct / 100.0),
    };
    let activation_price = match direction {
        Direction::Long => entry_price * (1.0 + params.trailing_activation_pct / 100.0),
        Direction::Short => entry_price * (1.0 - params.trailing_activation_pct / 100.0),
    };
    let liquidation_price = match direction {
        Direction::Long => entry_price * (1.0 - params.liquidation_threshold / leverage),
        Direction::Short => entry_price * (1.0 + params.liquidation_threshold / leverage),
    };
    let liquidation_threshold_pct = -(100.0 / leverage) * params.liquidation_threshold;

    let t_phase1_end = entry_time + params.phase1_duration();
    let t_breakeven_end = t_phase1_end + params.breakeven_window();

    let mut trailing_peak = entry_price;
    let mut trailing_stop: Option<f64> = None;
    let mut trailing_active = false;
    let mut activation_candle_time: Option<DateTime<Utc>> = None;

    let mut found: Option<(DateTime<Utc>, f64, CloseReason)> = None;
    let mut last_seen_close = entry_price;

    for candle in &candles[entry_idx..] {
        if candle.timestamp > params.simulation_end_time {
            break;
        }
        last_seen_close = candle.close;

        match phase_at(candle.timestamp, t_phase1_end, t_breakeven_end) {
            Phase::ActiveRisk => {
                let unrealized_pct = match direction {
                    Direction::Long => (candle.low - entry_price) / entry_price * 100.0,
                    Direction::Short => (entry_price - candle.high) / entry_price * 100.0,
                };
                if unrealized_pct <= liquidation_threshold_pct {
                    let price = apply_slippage(liquidation_price, direction, params.slippage_pct);
                    found = Some((candle.timestamp, price, CloseReason::Liquidation));
                    break;
                }

                let sl_hit = if !trailing_active {
                    match direction {
                        Direction::Long => candle.low <= sl_price,
                        Direction::Short => candle.high >= sl_price,
                    }
                } else {
                    false
                };
                let tp_hit = !params.use_trailing_stop
                    && match direction {
                        Direction::Long => candle.high >= tp_price,
                        Direction::Short => candle.low <= tp_price,
                    };

                // SL/liquidation before TP for LONG; TP before SL for SHORT (spec §4.2, §9).
                let resolved = match direction {
                    Direction::Long => {
                        if sl_hit {
                            Some((sl_price, CloseReason::StopLoss))
                        } else if tp_hit {
                            Some((tp_price, CloseReason::TakeProfit))
                        } else {
                            None
                        }
                    }
                    Direction::Short => {
                        if tp_hit {
                            Some((tp_price, CloseReason::TakeProfit))
                        } else if sl_hit {
                            Some((sl_price, CloseReason::StopLoss))
                        } else {
                            None
                        }
                    }
                };
                if let Some((price, reason)) = resolved {
                    let price = if reason == CloseReason::StopLoss {
                        apply_slippage(price, direction, params.slippage_pct)
                    } else {
                        price
                    };
                    found = Some((candle.timestamp, price, reason));
                    break;
                }

                if params.use_trailing_stop {
                    trailing_peak = match direction {
                        Direction::Long => trailing_peak.max(candle.high),
                        Direction::Short => trailing_peak.min(candle.low),
                    };

                    if !trailing_active {
                        let armed = match direction {
                            Direction::Long => trailing_peak >= activation_price,
                            Direction::Short => trailing_peak <= activation_price,
                        };
                        if armed {
                            trailing_active = true;
                            activation_candle_time = Some(candle.timestamp);
                            trailing_stop = Some(match direction {
                                Direction::Long => {
                                    trailing_peak * (1.0 - params.trailing_distance_pct / 100.0)
                                }
                                Direction::Short => {
                                    trailing_peak * (1.0 + params.trailing_distance_pct / 100.0)
                                }
                            });
                        }
                    } else {
                        let candidate = match direction {
                            Direction::Long => {
                                trailing_peak * (1.0 - params.trailing_distance_pct / 100.0)
                            }
                            Direction::Short => {
                                trailing_peak * (1.0 + params.trailing_distance_pct / 100.0)
                            }
                        };
                        trailing_stop = Some(match direction {
                            Direction::Long => trailing_stop.unwrap().max(candidate),
                            Direction::Short => trailing_stop.unwrap().min(candidate),
                        });
                    }

                    if trailing_active && activation_candle_time != Some(candle.timestamp) {
                        let stop = trailing_stop.expect("trailing_stop set once armed");
                        let triggered = match direction {
                            Direction::Long => candle.low <= stop,
                            Direction::Short => candle.high >= stop,
                        };
                        if triggered {
                            let price = apply_slippage(stop, direction, params.slippage_pct);
                            found = Some((candle.timestamp, price, CloseReason::TrailingStop));
                            break;
                        }
                    }
                }
            }
            Phase::Breakeven => {
                let hit = match direction {
                    Direction::Long => candle.high >= entry_price,
                    Direction::Short => candle.low <= entry_price,
                };
                if hit {
                    found = Some((candle.timestamp, entry_price, CloseReason::Breakeven));
                    break;
                }
            }
            Phase::SmartLoss => {
                let hours_past = (candle.timestamp - t_breakeven_end).num_seconds() as f64 / 3600.0;
                let h = hours_past.ceil().max(1.0);
                let pct = 0.5 * h / 100.0;
                let price = match direction {
                    Direction::Long => entry_price * (1.0 - pct),
                    Direction::Short => entry_price * (1.0 + pct),
                };
                found = Some((candle.timestamp, price, CloseReason::SmartLoss));
                break;
            }
        }
    }

    let (close_time, close_price, close_reason) = found.unwrap_or((
        params.simulation_end_time,
        last_seen_close,
        CloseReason::ForcedPeriodEnd,
    ));

    let (gross_pnl, exit_commission, net_pnl) = if close_reason == CloseReason::Liquidation {
        // Liquidation always settles at exactly max_loss (spec §4.2), independent of the
        // PnL implied by the (already slipped) liquidation price; gross_pnl is derived from
        // that fixed net figure so gross - entry_commission - exit_commission still holds.
        let exit_commission = Money::from_f64(effective_notional * params.commission_rate);
        let net_pnl = -(margin - entry_commission);
        let gross_pnl = net_pnl + entry_commission + exit_commission;
        (gross_pnl, exit_commission, net_pnl)
    } else {
        settle(
            direction,
            entry_price,
            close_price,
            effective_notional,
            params.commission_rate,
            entry_commission,
            margin,
        )
    };

    let absolute_peak = walk_absolute_peak(candles, entry_idx, params.simulation_end_time, direction, entry_price);
    let peak_pct = direction.sign() * (absolute_peak - entry_price) / entry_price * 100.0;
    let max_potential_net_pnl = (Money::from_f64(effective_notional * peak_pct.abs() / 100.0)
        - entry_commission * 2.0)
        .max(Money::ZERO);

    Some(SimulatedEntry {
        entry_time,
        entry_price,
        entry_commission,
        margin,
        direction,
        close_time,
        close_price,
        close_reason,
        gross_pnl,
        exit_commission,
        net_pnl,
        peak_favorable_price: absolute_peak,
        max_potential_net_pnl,
    })
}

/// Best favorable price touched across the full walk through `simulation_end_time`,
/// independent of where the position actually closed — used only for the
/// `max_potential_net_pnl` analytics figure.
fn walk_absolute_peak(
    candles: &[Candle],
    entry_idx: usize,
    simulation_end_time: DateTime<Utc>,
    direction: Direction,
    entry_price: f64,
) -> f64 {
    let mut peak = entry_price;
    for candle in &candles[entry_idx..] {
        if candle.timestamp > simulation_end_time {
            break;
        }
        peak = match direction {
            Direction::Long => peak.max(candle.high),
            Direction::Short => peak.min(candle.low),
        };
    }
    peak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::StrategyParams;
    use crate::signal::{Signal, SignalAction};
    use crate::types::Symbol;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn base_params(end_hours: i64) -> StrategyParams {
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
            max_trades_per_wave: 2,
            initial_capital: 1000.0,
            simulation_end_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + Duration::hours(end_hours),
            wave_interval_minutes: 15,
            phase1_hours: 24,
            breakeven_window_hours: 8,
            smart_loss_pct_per_hour: 0.5,
            forced_close_max_loss_fraction: 0.95,
        }
    }

    fn signal_at(t: DateTime<Utc>, action: SignalAction) -> Signal {
        Signal {
            signal_id: 1,
            pair_symbol: Symbol::new("BTCUSDT"),
            trading_pair_id: 1,
            exchange_id: 1,
            signal_action: action,
            signal_timestamp: t,
            score_week: 80.0,
            score_month: 80.0,
            open_interest: None,
            volume: None,
        }
    }

    fn candle(t: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(t, open, high, low, close, 1000.0).unwrap()
    }

    // S1 — take-profit LONG.
    #[test]
    fn s1_take_profit_long() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let params = base_params(48);
        let signal = signal_at(t0, SignalAction::Long);
        let candles = vec![
            candle(t0, 100.0, 100.0, 100.0, 100.0),
            candle(t0 + Duration::minutes(5), 100.0, 104.0, 99.0, 103.0),
            candle(t0 + Duration::minutes(10), 103.0, 105.0, 102.0, 104.0),
        ];
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::TakeProfit);
        assert_eq!(out.close_price, 104.0);
        assert_eq!(out.gross_pnl, Money::from_f64(40.0));
        assert_eq!(out.net_pnl.round_dp(2), Money::from_f64(38.80));
    }

    // S2 — trailing LONG activation and exit.
    #[test]
    fn s2_trailing_activation_and_exit() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut params = base_params(48);
        params.use_trailing_stop = true;
        params.trailing_activation_pct = 1.0;
        params.trailing_distance_pct = 2.0;
        let signal = signal_at(t0, SignalAction::Long);
        let candles = vec![
            candle(t0, 100.0, 100.0, 100.0, 100.0),
            candle(t0 + Duration::minutes(5), 100.0, 101.0, 100.0, 101.0),
            candle(t0 + Duration::minutes(10), 101.0, 103.0, 101.0, 103.0),
            candle(t0 + Duration::minutes(15), 103.0, 103.0, 101.0, 101.0),
            candle(t0 + Duration::minutes(20), 101.0, 101.0, 100.0, 100.0),
        ];
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::TrailingStop);
        assert_abs_diff_eq!(out.close_price, 100.94, epsilon = 1e-9);
    }

    // S3 — liquidation cap.
    #[test]
    fn s3_liquidation_cap() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let params = base_params(48);
        let signal = signal_at(t0, SignalAction::Long);
        let candles = vec![
            candle(t0, 100.0, 100.0, 100.0, 100.0),
            candle(t0 + Duration::minutes(5), 100.0, 100.0, 88.0, 90.0),
        ];
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::Liquidation);
        assert_abs_diff_eq!(out.net_pnl.to_f64(), -99.4, epsilon = 1e-6);
    }

    // S4 — smart loss at 35h.
    #[test]
    fn s4_smart_loss_at_35h() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let params = base_params(48);
        let signal = signal_at(t0, SignalAction::Long);
        let mut candles = vec![candle(t0, 100.0, 100.0, 100.0, 100.0)];
        candles.push(candle(t0 + Duration::hours(35), 100.0, 100.0, 100.0, 100.0));
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::SmartLoss);
        assert_abs_diff_eq!(out.close_price, 100.0 * (1.0 - 0.015), epsilon = 1e-9);
    }

    #[test]
    fn no_entry_when_no_candle_at_or_after_signal() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let params = base_params(48);
        let signal = signal_at(t0 + Duration::hours(1), SignalAction::Long);
        let candles = vec![candle(t0, 100.0, 100.0, 100.0, 100.0)];
        assert!(simulate(&signal, &candles, &params).is_none());
    }

    #[test]
    fn trailing_stop_never_retreats_for_long() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut params = base_params(48);
        params.use_trailing_stop = true;
        let signal = signal_at(t0, SignalAction::Long);
        let candles = vec![
            candle(t0, 100.0, 100.0, 100.0, 100.0),
            candle(t0 + Duration::minutes(5), 100.0, 105.0, 100.0, 105.0),
            candle(t0 + Duration::minutes(10), 105.0, 106.0, 104.0, 104.5),
            candle(t0 + Duration::minutes(15), 104.5, 104.5, 96.0, 96.5),
        ];
        let out = simulate(&signal, &candles, &params).unwrap();
        // trailing from peak 106 -> stop 103.88, never retreats below that once armed.
        assert_eq!(out.close_reason, CloseReason::TrailingStop);
        assert!(out.close_price <= 103.88 + 1e-6);
    }

    // Boundary: stop_loss_pct = 0 fires on any adverse tick at all.
    #[test]
    fn zero_stop_loss_fires_on_any_adverse_tick() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut params = base_params(48);
        params.stop_loss_pct = 0.0;
        let signal = signal_at(t0, SignalAction::Long);
        let candles = vec![
            candle(t0, 100.0, 100.0, 100.0, 100.0),
            candle(t0 + Duration::minutes(5), 100.0, 100.1, 99.99, 100.0),
        ];
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::StopLoss);
        assert_abs_diff_eq!(out.close_price, apply_slippage(100.0, Direction::Long, params.slippage_pct), epsilon = 1e-9);
    }

    // Boundary: leverage = 1 with a deep drawdown still caps the loss at exactly
    // position_size - entry_commission, never more, via the liquidation path (which always
    // settles at max_loss regardless of how far the candle's low overshoots it).
    #[test]
    fn leverage_one_deep_drawdown_caps_loss_at_margin_minus_commission() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut params = base_params(48);
        params.leverage = 1;
        let signal = signal_at(t0, SignalAction::Long);
        let candles = vec![
            candle(t0, 100.0, 100.0, 100.0, 100.0),
            // -95% unrealized vs. a -(100/1)*0.9 = -90% liquidation threshold.
            candle(t0 + Duration::minutes(5), 100.0, 100.0, 5.0, 5.0),
        ];
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::Liquidation);
        let max_loss = -(out.margin - out.entry_commission);
        assert_eq!(out.net_pnl, max_loss);
    }

    // Boundary: a signal whose only eligible candle sits exactly at simulation_end_time
    // still enters (the half-open "no candle before end" condition is `>`, not `>=`).
    #[test]
    fn entry_exactly_at_simulation_end_time_still_enters() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut params = base_params(0);
        params.simulation_end_time = t0;
        let signal = signal_at(t0, SignalAction::Long);
        let candles = vec![candle(t0, 100.0, 100.0, 100.0, 100.0)];
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::ForcedPeriodEnd);
        assert_eq!(out.close_time, t0);
    }

    // Boundary: a trailing stop armed on a bar whose own low would imply a trigger must not
    // trigger on that same bar (spec §4.2's same-bar exclusion) — it only fires once the
    // (unchanged) trailing level is breached on a later bar.
    #[test]
    fn trailing_stop_does_not_trigger_on_its_own_arming_bar() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut params = base_params(48);
        params.use_trailing_stop = true;
        params.trailing_activation_pct = 1.0;
        params.trailing_distance_pct = 2.0;
        let signal = signal_at(t0, SignalAction::Long);
        // bar1 arms at peak 101 -> trailing_stop 98.98, with a low (98.5) that stays above
        // both the trailing stop and the fixed SL (98) so nothing fires on the arming bar
        // itself. bar2's low (98.0) then breaches the (unchanged) trailing stop.
        let candles = vec![
            candle(t0, 100.0, 100.0, 100.0, 100.0),
            candle(t0 + Duration::minutes(5), 100.0, 101.0, 98.5, 99.0),
            candle(t0 + Duration::minutes(10), 99.0, 99.0, 98.0, 98.0),
        ];
        let out = simulate(&signal, &candles, &params).unwrap();
        assert_eq!(out.close_reason, CloseReason::TrailingStop);
        assert_eq!(out.close_time, t0 + Duration::minutes(10));
        assert_abs_diff_eq!(
            out.close_price,
            apply_slippage(98.98, Direction::Long, params.slippage_pct),
            epsilon = 1e-9
        );
    }
}
