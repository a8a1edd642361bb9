//! File-backed, read-only implementations of the Candle Store and Signal Source contracts,
//! for local backtesting and the integration test suite.

mod csv_candle;
mod csv_signal;

pub use csv_candle::CsvCandleStore;
pub use csv_signal::CsvSignalSource;
