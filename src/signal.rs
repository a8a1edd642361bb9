//! Trading signals and the eligibility predicate applied by the Signal Source.

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SkipReason;
use crate::types::Symbol;

/// BUY/SELL recommendation direction, as published by the signal feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Long,
    Short,
}

/// One time-stamped trading recommendation for a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: u64,
    pub pair_symbol: Symbol,
    pub trading_pair_id: u32,
    pub exchange_id: u32,
    pub signal_action: SignalAction,
    pub signal_timestamp: DateTime<Utc>,
    pub score_week: f64,
    pub score_month: f64,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// The full eligibility predicate from the data model: score thresholds, allowed hours,
/// selected exchanges, and an optional liquidity gate on OI/volume.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    pub score_week_min: f64,
    pub score_month_min: f64,
    pub allowed_hours: Vec<u8>,
    pub selected_exchanges: Vec<u32>,
    pub liquidity: Option<LiquidityFilter>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Minimum open interest and/or volume a signal's pair must show to pass the liquidity gate.
#[derive(Debug, Clone, Copy)]
pub struct LiquidityFilter {
    pub min_open_interest: Option<f64>,
    pub min_volume: Option<f64>,
}

/// The result of a [`crate::interfaces::SignalSource::signals`] call: the signals that
/// passed the eligibility predicate, plus a count of everything the source itself rejected,
/// by reason — so `filter_score`/`filter_hour`/`filter_exchange`/`filter_liquidity`
/// rejections reach [`crate::session::SessionSummary::skipped`] instead of being discarded
/// at the source boundary.
#[derive(Debug, Clone, Default)]
pub struct SignalBatch {
    pub signals: Vec<Signal>,
    pub skipped: HashMap<SkipReason, u64>,
}

impl SignalFilter {
    /// Evaluates the full predicate from spec §3, returning the reason for rejection (if
    /// any) so the caller can count it by [`SkipReason`].
    pub fn reject_reason(&self, signal: &Signal) -> Option<SkipReason> {
        if signal.score_week < self.score_week_min || signal.score_month < self.score_month_min {
            return Some(SkipReason::FilterScore);
        }
        let hour = signal.signal_timestamp.hour() as u8;
        if !self.allowed_hours.is_empty() && !self.allowed_hours.contains(&hour) {
            return Some(SkipReason::FilterHour);
        }
        if !self.selected_exchanges.is_empty()
            && !self.selected_exchanges.contains(&signal.exchange_id)
        {
            return Some(SkipReason::FilterExchange);
        }
        if let Some(liquidity) = &self.liquidity {
            let oi_ok = liquidity
                .min_open_interest
                .map(|min| signal.open_interest.unwrap_or(0.0) >= min)
                .unwrap_or(true);
            let vol_ok = liquidity
                .min_volume
                .map(|min| signal.volume.unwrap_or(0.0) >= min)
                .unwrap_or(true);
            if !oi_ok || !vol_ok {
                return Some(SkipReason::FilterLiquidity);
            }
        }
        None
    }

    pub fn is_eligible(&self, signal: &Signal) -> bool {
        self.reject_reason(signal).is_none()
    }
}
