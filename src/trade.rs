//! Trade outcomes and open-position bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Direction, Money, Symbol};

/// Closed-form reason a position exited. A closed sum type rather than a string, so the
/// loss-capping step (see [`crate::simulator::cap_loss_to_margin`]) is a total function
/// over it and can't drift into an unrecognized string at some call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Liquidation,
    Breakeven,
    SmartLoss,
    ForcedPeriodEnd,
    ForcedLiquidation,
}

impl CloseReason {
    /// Slippage applies only to stop-style and liquidation-style exits (spec §9).
    pub fn applies_slippage(self) -> bool {
        matches!(
            self,
            CloseReason::StopLoss
                | CloseReason::Liquidation
                | CloseReason::TrailingStop
                | CloseReason::ForcedLiquidation
        )
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::TakeProfit => "take_profit",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TrailingStop => "trailing_stop",
            CloseReason::Liquidation => "liquidation",
            CloseReason::Breakeven => "breakeven",
            CloseReason::SmartLoss => "smart_loss",
            CloseReason::ForcedPeriodEnd => "forced_period_end",
            CloseReason::ForcedLiquidation => "forced_liquidation",
        };
        write!(f, "{s}")
    }
}

/// One fully-closed trade, produced once per admitted signal and appended to the
/// append-only ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub signal_id: u64,
    pub pair_symbol: Symbol,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_commission: Money,
    pub close_time: DateTime<Utc>,
    pub close_price: f64,
    pub close_reason: CloseReason,
    pub gross_pnl: Money,
    pub exit_commission: Money,
    pub net_pnl: Money,
    pub peak_favorable_price: f64,
    pub max_potential_net_pnl: Money,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        !self.net_pnl.is_negative() && !self.net_pnl.is_zero()
    }

    pub fn is_loss(&self) -> bool {
        self.net_pnl.is_negative()
    }

    pub fn is_breakeven(&self) -> bool {
        self.net_pnl.is_zero()
    }
}

/// A live position tracked by the Wave Scheduler, indexed by `pair_symbol`. Carries the
/// projected outcome computed once by the Position Simulator at admission time; the
/// scheduler re-evaluates nothing until the projected close time arrives.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub signal_id: u64,
    pub pair_symbol: Symbol,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_commission: Money,
    pub margin: Money,
    pub projected_close_time: DateTime<Utc>,
    pub projected_close_price: f64,
    pub projected_close_reason: CloseReason,
    pub projected_gross_pnl: Money,
    pub projected_exit_commission: Money,
    pub projected_net_pnl: Money,
    pub peak_favorable_price: f64,
    pub max_potential_net_pnl: Money,
}

impl OpenPosition {
    /// Converts the projection into the ledger row appended once the position closes.
    pub fn into_outcome(self) -> TradeOutcome {
        TradeOutcome {
            signal_id: self.signal_id,
            pair_symbol: self.pair_symbol,
            direction: self.direction,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            entry_commission: self.entry_commission,
            close_time: self.projected_close_time,
            close_price: self.projected_close_price,
            close_reason: self.projected_close_reason,
            gross_pnl: self.projected_gross_pnl,
            exit_commission: self.projected_exit_commission,
            net_pnl: self.projected_net_pnl,
            peak_favorable_price: self.peak_favorable_price,
            max_potential_net_pnl: self.max_potential_net_pnl,
        }
    }

    /// Overrides the projection at finalization time (forced period-end / forced
    /// liquidation), re-deriving the outcome from a freshly recomputed close.
    pub fn with_final_close(
        mut self,
        close_time: DateTime<Utc>,
        close_price: f64,
        close_reason: CloseReason,
        gross_pnl: Money,
        exit_commission: Money,
        net_pnl: Money,
    ) -> TradeOutcome {
        self.projected_close_time = close_time;
        self.projected_close_price = close_price;
        self.projected_close_reason = close_reason;
        self.projected_gross_pnl = gross_pnl;
        self.projected_exit_commission = exit_commission;
        self.projected_net_pnl = net_pnl;
        self.into_outcome()
    }
}
