//! Strategy parameters: the per-session configuration that drives both the Position
//! Simulator and the Wave Scheduler.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Parameters for one backtest session. Validated once, at session start, via
/// [`StrategyParams::validate`] — the wave loop never re-checks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Margin allocated per position, in USD.
    pub position_size: f64,
    pub leverage: i32,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub use_trailing_stop: bool,
    pub trailing_distance_pct: f64,
    pub trailing_activation_pct: f64,
    /// Flat, per-side commission rate applied to notional (e.g. `0.0006` = 6 bps).
    pub commission_rate: f64,
    /// Adverse-execution slippage applied only to stop/liquidation-style exits.
    pub slippage_pct: f64,
    /// Fraction of `1/leverage` unrealized loss that triggers liquidation, in `(0, 1]`.
    pub liquidation_threshold: f64,
    pub max_trades_per_wave: u32,
    pub initial_capital: f64,
    pub simulation_end_time: DateTime<Utc>,

    #[serde(default = "default_wave_interval_minutes")]
    pub wave_interval_minutes: i64,
    #[serde(default = "default_phase1_hours")]
    pub phase1_hours: i64,
    #[serde(default = "default_breakeven_window_hours")]
    pub breakeven_window_hours: i64,
    #[serde(default = "default_smart_loss_pct_per_hour")]
    pub smart_loss_pct_per_hour: f64,
    #[serde(default = "default_forced_close_max_loss_fraction")]
    pub forced_close_max_loss_fraction: f64,
}

fn default_wave_interval_minutes() -> i64 {
    15
}
fn default_phase1_hours() -> i64 {
    24
}
fn default_breakeven_window_hours() -> i64 {
    8
}
fn default_smart_loss_pct_per_hour() -> f64 {
    0.5
}
fn default_forced_close_max_loss_fraction() -> f64 {
    0.95
}

impl StrategyParams {
    pub fn wave_interval(&self) -> Duration {
        Duration::minutes(self.wave_interval_minutes)
    }

    pub fn phase1_duration(&self) -> Duration {
        Duration::hours(self.phase1_hours)
    }

    pub fn breakeven_window(&self) -> Duration {
        Duration::hours(self.breakeven_window_hours)
    }

    /// Margin times leverage: the notional exposure used for all PnL-percent math.
    pub fn effective_notional(&self) -> f64 {
        self.position_size * self.leverage as f64
    }

    /// Validates invariants from the data model before any wave is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.position_size <= 0.0 {
            return Err(ConfigError::NonPositivePositionSize(self.position_size));
        }
        if self.leverage < 1 {
            return Err(ConfigError::InvalidLeverage(self.leverage));
        }
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveInitialCapital(self.initial_capital));
        }
        for (field, value) in [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("trailing_distance_pct", self.trailing_distance_pct),
            ("trailing_activation_pct", self.trailing_activation_pct),
            ("commission_rate", self.commission_rate),
            ("slippage_pct", self.slippage_pct),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativePercent { field, value });
            }
        }
        if self.max_trades_per_wave < 1 {
            return Err(ConfigError::InvalidMaxTradesPerWave(self.max_trades_per_wave));
        }
        if self.liquidation_threshold <= 0.0 || self.liquidation_threshold > 1.0 {
            return Err(ConfigError::InvalidLiquidationThreshold(
                self.liquidation_threshold,
            ));
        }
        Ok(())
    }
}
