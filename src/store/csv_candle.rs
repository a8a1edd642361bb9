//! CSV-backed [`CandleStore`]: loads `{trading_pair_id}_{timeframe}.csv` files from a data
//! directory once at construction, keyed by `(trading_pair_id, timeframe)`, mirroring the
//! teacher's `data::load_multi_symbol` eager-load convention.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::DataSourceError;
use crate::interfaces::CandleStore;
use crate::types::Candle;

/// Read-only, in-memory candle store populated from CSV files under a data directory.
///
/// Every file is read once in [`CsvCandleStore::load`]; [`CandleStore::candles`] is then a
/// pure slice over already-resident data, matching spec §5's "read once into an in-memory
/// map before the wave loop starts" requirement.
pub struct CsvCandleStore {
    series: HashMap<(u32, String), Vec<Candle>>,
}

impl CsvCandleStore {
    /// Loads `{trading_pair_id}_{timeframe}.csv` for every `(trading_pair_id, timeframe)` pair
    /// requested. Missing files are not an error at construction time — they surface as a
    /// [`DataSourceError::CandleFetch`] the first time that pair/timeframe is requested.
    pub fn load(
        data_dir: impl AsRef<Path>,
        pairs: &[(u32, &str)],
    ) -> Result<Self, DataSourceError> {
        let data_dir = data_dir.as_ref();
        let mut series = HashMap::new();
        for &(trading_pair_id, timeframe) in pairs {
            let path = file_path(data_dir, trading_pair_id, timeframe);
            if !path.exists() {
                continue;
            }
            let candles = load_csv(&path)?;
            series.insert((trading_pair_id, timeframe.to_string()), candles);
        }
        Ok(Self { series })
    }
}

fn file_path(data_dir: &Path, trading_pair_id: u32, timeframe: &str) -> PathBuf {
    data_dir.join(format!("{trading_pair_id}_{timeframe}.csv"))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DataSourceError> {
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            .map_err(|_| DataSourceError::CandleFetch {
                pair: crate::types::Symbol::new(raw),
                timeframe: String::new(),
                message: format!("unparseable timestamp: {raw}"),
            })
    })
}

fn load_csv(path: &Path) -> Result<Vec<Candle>, DataSourceError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut candles = Vec::new();
    for result in reader.records() {
        let record = result?;
        let timestamp = parse_timestamp(record.get(0).unwrap_or(""))?;
        let field = |idx: usize, name: &'static str| -> Result<f64, DataSourceError> {
            record
                .get(idx)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| DataSourceError::CandleFetch {
                    pair: crate::types::Symbol::new(path.to_string_lossy()),
                    timeframe: String::new(),
                    message: format!("missing or unparseable column `{name}`"),
                })
        };
        let open = field(1, "open")?;
        let high = field(2, "high")?;
        let low = field(3, "low")?;
        let close = field(4, "close")?;
        let volume = field(5, "volume")?;
        let mark_price = record.get(6).and_then(|s| s.parse::<f64>().ok());
        let open_interest = record.get(7).and_then(|s| s.parse::<f64>().ok());

        let mut candle = Candle::new(timestamp, open, high, low, close, volume).map_err(|e| {
            DataSourceError::CandleFetch {
                pair: crate::types::Symbol::new(path.to_string_lossy()),
                timeframe: String::new(),
                message: e.to_string(),
            }
        })?;
        if let Some(mp) = mark_price {
            candle = candle.with_mark_price(mp);
        }
        if let Some(oi) = open_interest {
            candle = candle.with_open_interest(oi);
        }
        candles.push(candle);
    }
    Ok(candles)
}

impl CandleStore for CsvCandleStore {
    fn candles(
        &self,
        trading_pair_id: u32,
        timeframe: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataSourceError> {
        let series = self
            .series
            .get(&(trading_pair_id, timeframe.to_string()))
            .ok_or_else(|| DataSourceError::CandleFetch {
                pair: crate::types::Symbol::new(trading_pair_id.to_string()),
                timeframe: timeframe.to_string(),
                message: "no data file loaded for this pair/timeframe".to_string(),
            })?;
        Ok(series
            .iter()
            .filter(|c| c.timestamp >= from && c.timestamp <= to)
            .copied()
            .collect())
    }
}
