//! Configuration management: loads a [`SessionConfig`] from a JSON file, following the
//! teacher's `Config::from_file` convention (JSON file plus environment-variable overlay for
//! fields that shouldn't live in a committed file).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::params::StrategyParams;
use crate::signal::{LiquidityFilter, SignalFilter};

/// Top-level session configuration: strategy parameters, the signal eligibility filter, the
/// session window, and the data/output paths the CLI shell wires into the concrete store and
/// sink implementations. None of this is consumed by the core — [`crate::session::run_session`]
/// only ever sees the trait objects this config is used to construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: String,
    /// Caller identity, threaded unmodified into `SessionRequest::user_id` (spec §6).
    pub user_id: String,
    pub exchange_id: u32,
    pub params: StrategyParams,
    pub filter: SignalFilterConfig,
    pub data: DataConfig,
}

impl SessionConfig {
    /// Load configuration from a JSON file. `CRYPTO_WAVE_DATA_DIR` and
    /// `CRYPTO_WAVE_RESULTS_DB`, if set, override the corresponding `data` fields — the same
    /// pattern the teacher uses for exchange API credentials, applied here to deployment-local
    /// paths instead of secrets (the core has none).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let mut config: SessionConfig =
            serde_json::from_str(&contents).context("failed to parse config JSON")?;

        if let Ok(dir) = std::env::var("CRYPTO_WAVE_DATA_DIR") {
            config.data.candle_dir = dir;
        }
        if let Ok(db) = std::env::var("CRYPTO_WAVE_RESULTS_DB") {
            config.data.results_db = db;
        }

        Ok(config)
    }

    /// Resolves the full eligibility predicate (spec §3) for this session: `filter`'s fields
    /// plus a window running from `filter.window_from` through `params.simulation_end_time`.
    pub fn signal_filter(&self) -> SignalFilter {
        let liquidity = if self.filter.min_open_interest.is_some() || self.filter.min_volume.is_some() {
            Some(LiquidityFilter {
                min_open_interest: self.filter.min_open_interest,
                min_volume: self.filter.min_volume,
            })
        } else {
            None
        };
        SignalFilter {
            score_week_min: self.filter.score_week_min,
            score_month_min: self.filter.score_month_min,
            allowed_hours: self.filter.allowed_hours.clone(),
            selected_exchanges: self.filter.selected_exchanges.clone(),
            liquidity,
            from: self.filter.window_from,
            to: self.params.simulation_end_time,
        }
    }
}

/// The eligibility predicate fields from spec §3, prior to resolving `from`/`to` against
/// `params.simulation_end_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalFilterConfig {
    pub score_week_min: f64,
    pub score_month_min: f64,
    #[serde(default)]
    pub allowed_hours: Vec<u8>,
    #[serde(default)]
    pub selected_exchanges: Vec<u32>,
    #[serde(default)]
    pub min_open_interest: Option<f64>,
    #[serde(default)]
    pub min_volume: Option<f64>,
    pub window_from: chrono::DateTime<chrono::Utc>,
}

/// Paths to local data files/directories the CLI shell wires into [`crate::store`] and
/// [`crate::sink`] implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory containing `{trading_pair_id}_{timeframe}.csv` candle files.
    pub candle_dir: String,
    /// Path to the signals CSV file.
    pub signals_csv: String,
    /// Known `(trading_pair_id, pair_symbol)` pairs, so the CLI shell can pre-declare which
    /// candle files to load without first reading the signals file.
    pub trading_pairs: Vec<TradingPairConfig>,
    /// SQLite database path for the durable Result Sink.
    pub results_db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPairConfig {
    pub trading_pair_id: u32,
    pub pair_symbol: String,
}
