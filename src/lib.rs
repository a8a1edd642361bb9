//! Wave-based backtesting engine for signal-driven crypto futures strategies.
//!
//! The core (spec components 1-7) is the wave-based simulation engine: [`simulator`] walks
//! one signal's candle history under the three-phase timeline; [`scheduler`] bins signals
//! into 15-minute waves and drives admission, closure, and equity tracking; [`session`] is
//! the single top-level entry point, [`session::run_session`]. Everything else in this crate
//! — [`store`], [`sink`], [`config`], the CLI binary — is an ambient, swappable collaborator
//! reached only through the traits in [`interfaces`].

pub mod cancellation;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod ledger;
pub mod params;
pub mod params_source;
pub mod scheduler;
pub mod signal;
pub mod simulator;
pub mod sink;
pub mod session;
pub mod store;
pub mod trade;
pub mod types;

pub use cancellation::CancellationToken;
pub use error::{ConfigError, CoreError, DataSourceError, SinkError, SkipReason};
pub use params::StrategyParams;
pub use session::{run_session, SessionRequest, SessionSummary, StrategyOverrides};
pub use signal::{Signal, SignalAction, SignalBatch, SignalFilter};
pub use trade::{CloseReason, OpenPosition, TradeOutcome};
pub use types::{Candle, Direction, Money, Symbol};
