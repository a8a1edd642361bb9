//! `crypto-wave-backtester` — thin CLI shell around [`crypto_wave_backtester::run_session`].
//!
//! Explicitly outside the core (spec §1): wires a file config, CSV-backed data sources, and a
//! SQLite result sink together, then drives one session. No simulation logic lives here.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crypto_wave_backtester::cancellation::CancellationToken;
use crypto_wave_backtester::config::SessionConfig;
use crypto_wave_backtester::interfaces::ProgressReporter;
use crypto_wave_backtester::params_source::StaticParamsSource;
use crypto_wave_backtester::session::{run_session, SessionRequest, StrategyOverrides};
use crypto_wave_backtester::sink::SqliteResultSink;
use crypto_wave_backtester::store::{CsvCandleStore, CsvSignalSource};

/// Drives an `indicatif` spinner/bar while the Session Runner prefetches candle history.
struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pairs fetched",
            )
            .expect("valid progress template")
            .progress_chars("#>-"),
        );
        Self { bar }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn set_total(&mut self, total: u64) {
        self.bar.set_length(total);
    }

    fn inc(&mut self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

#[derive(Parser, Debug)]
#[command(name = "crypto-wave-backtester")]
#[command(about = "Wave-based backtesting engine for signal-driven crypto futures strategies", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a session configuration JSON file.
    #[arg(short, long, default_value = "configs/session.json")]
    config: String,

    /// Override `position_size` from the config.
    #[arg(long)]
    position_size: Option<f64>,

    /// Override `leverage` from the config.
    #[arg(long)]
    leverage: Option<i32>,

    /// Override `max_trades_per_wave` from the config.
    #[arg(long)]
    max_trades_per_wave: Option<u32>,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;
    let log_filename = format!(
        "backtest_{}.log",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_ansi(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let config =
        SessionConfig::from_file(&cli.config).with_context(|| format!("loading {}", cli.config))?;
    info!(session_id = %config.session_id, "loaded session config");

    let pairs: Vec<(u32, &str)> = config
        .data
        .trading_pairs
        .iter()
        .map(|p| (p.trading_pair_id, "5m"))
        .collect();
    let candle_store = CsvCandleStore::load(&config.data.candle_dir, &pairs)
        .context("loading candle history")?;
    let signal_source =
        CsvSignalSource::load(&config.data.signals_csv).context("loading signals")?;
    let params_source = StaticParamsSource(config.params.clone());
    let mut sink =
        SqliteResultSink::open(PathBuf::from(&config.data.results_db)).context("opening result sink")?;

    let overrides = StrategyOverrides {
        position_size: cli.position_size,
        leverage: cli.leverage,
        max_trades_per_wave: cli.max_trades_per_wave,
    };

    let filter = config.signal_filter();
    let mut progress = IndicatifProgressReporter::new();
    let request = SessionRequest {
        session_id: config.session_id.clone(),
        user_id: config.user_id.clone(),
        exchange_id: config.exchange_id,
        filter,
        window_from: config.filter.window_from,
        window_to: config.params.simulation_end_time,
        overrides,
        progress: &mut progress,
        // No signal handler wired up here: this binary runs one session and exits, so
        // there's nothing for Ctrl+C to interrupt short of killing the process outright.
        cancel: CancellationToken::new(),
    };

    let summary = run_session(
        request,
        &candle_store,
        &signal_source,
        &params_source,
        &mut sink,
    )?;

    println!("{}", "=".repeat(60));
    println!("SESSION SUMMARY — {}", summary.session_id);
    println!("{}", "=".repeat(60));
    println!("Initial capital:        {}", summary.initial_capital);
    println!("Final equity:           {}", summary.final_equity);
    println!("Realized PnL:           {}", summary.realized_pnl);
    println!("Commission paid:        {}", summary.commission_paid);
    println!("Min equity:             {}", summary.min_equity);
    println!("Max concurrent trades:  {}", summary.max_concurrent_positions);
    println!("Max drawdown:           {} ({:.2}%)", summary.max_drawdown_usd, summary.max_drawdown_pct);
    println!("Total trades:           {}", summary.total_trades);
    println!("Wins / losses / BE:     {} / {} / {}", summary.wins, summary.losses, summary.breakevens);
    println!("Win rate:               {:.2}%", summary.win_rate);
    for (reason, count) in &summary.skipped {
        println!("Skipped ({reason}):      {count}");
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
