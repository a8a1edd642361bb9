//! CSV-backed [`SignalSource`]: loads one signals file at construction and applies the full
//! eligibility predicate from [`crate::signal::SignalFilter`] on every call to `signals()`.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::DataSourceError;
use crate::interfaces::SignalSource;
use crate::signal::{Signal, SignalAction, SignalBatch, SignalFilter};
use crate::types::Symbol;

pub struct CsvSignalSource {
    all: Vec<Signal>,
}

impl CsvSignalSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut all = Vec::new();
        for result in reader.records() {
            let record = result?;
            let get = |idx: usize| record.get(idx).unwrap_or("");

            let signal_id: u64 = get(0)
                .parse()
                .map_err(|_| DataSourceError::SignalFetch(format!("bad signal_id: {}", get(0))))?;
            let pair_symbol = Symbol::new(get(1));
            let trading_pair_id: u32 = get(2)
                .parse()
                .map_err(|_| DataSourceError::SignalFetch(format!("bad trading_pair_id: {}", get(2))))?;
            let exchange_id: u32 = get(3)
                .parse()
                .map_err(|_| DataSourceError::SignalFetch(format!("bad exchange_id: {}", get(3))))?;
            let signal_action = match get(4).to_ascii_uppercase().as_str() {
                "LONG" | "BUY" => SignalAction::Long,
                "SHORT" | "SELL" => SignalAction::Short,
                other => {
                    return Err(DataSourceError::SignalFetch(format!(
                        "unrecognized signal_action: {other}"
                    )))
                }
            };
            let signal_timestamp: DateTime<Utc> = get(5)
                .parse()
                .map_err(|_| DataSourceError::SignalFetch(format!("bad signal_timestamp: {}", get(5))))?;
            let score_week: f64 = get(6)
                .parse()
                .map_err(|_| DataSourceError::SignalFetch(format!("bad score_week: {}", get(6))))?;
            let score_month: f64 = get(7)
                .parse()
                .map_err(|_| DataSourceError::SignalFetch(format!("bad score_month: {}", get(7))))?;
            let open_interest = get(8).parse::<f64>().ok();
            let volume = get(9).parse::<f64>().ok();

            all.push(Signal {
                signal_id,
                pair_symbol,
                trading_pair_id,
                exchange_id,
                signal_action,
                signal_timestamp,
                score_week,
                score_month,
                open_interest,
                volume,
            });
        }
        Ok(Self { all })
    }
}

impl SignalSource for CsvSignalSource {
    fn signals(&self, filter: &SignalFilter) -> Result<SignalBatch, DataSourceError> {
        let mut signals = Vec::new();
        let mut skipped: HashMap<_, u64> = HashMap::new();
        for s in self
            .all
            .iter()
            .filter(|s| s.signal_timestamp >= filter.from && s.signal_timestamp <= filter.to)
        {
            match filter.reject_reason(s) {
                Some(reason) => *skipped.entry(reason).or_insert(0) += 1,
                None => signals.push(s.clone()),
            }
        }
        signals.sort_by_key(|s: &Signal| s.signal_timestamp);
        Ok(SignalBatch { signals, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn filter() -> SignalFilter {
        SignalFilter {
            score_week_min: 0.0,
            score_month_min: 0.0,
            allowed_hours: vec![],
            selected_exchanges: vec![],
            liquidity: None,
            from: "2026-01-01T00:00:00Z".parse().unwrap(),
            to: "2026-01-02T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn loads_and_applies_filter() {
        let dir = std::env::temp_dir().join("csv_signal_source_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("signals.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "1,BTCUSDT,1,1,LONG,2026-01-01T00:05:00Z,80,80").unwrap();
        writeln!(file, "2,ETHUSDT,2,1,SHORT,2026-01-01T00:10:00Z,10,10").unwrap();

        let source = CsvSignalSource::load(&path).unwrap();
        let mut f = filter();
        f.score_week_min = 50.0;
        let batch = source.signals(&f).unwrap();
        assert_eq!(batch.signals.len(), 1);
        assert_eq!(batch.signals[0].signal_id, 1);
        assert_eq!(
            *batch
                .skipped
                .get(&crate::error::SkipReason::FilterScore)
                .unwrap_or(&0),
            1
        );
    }
}
