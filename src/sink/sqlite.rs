//! Durable [`ResultSink`] over `rusqlite`, following the teacher's `SqliteStateManager`
//! schema conventions: `CREATE TABLE IF NOT EXISTS`, WAL journaling, and idempotent writes
//! keyed on `session_id` (spec §4.6).

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::error::SinkError;
use crate::interfaces::ResultSink;
use crate::params::StrategyParams;
use crate::session::SessionSummary;
use crate::trade::TradeOutcome;

pub struct SqliteResultSink {
    conn: Mutex<Connection>,
}

impl SqliteResultSink {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SinkError::Persist(e.to_string()))?;
        }
        let conn = Connection::open(db_path).map_err(|e| SinkError::Persist(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| SinkError::Persist(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                session_id TEXT NOT NULL,
                signal_id INTEGER NOT NULL,
                pair_symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                entry_price REAL NOT NULL,
                entry_commission TEXT NOT NULL,
                close_time TEXT NOT NULL,
                close_price REAL NOT NULL,
                close_reason TEXT NOT NULL,
                gross_pnl TEXT NOT NULL,
                exit_commission TEXT NOT NULL,
                net_pnl TEXT NOT NULL,
                peak_favorable_price REAL NOT NULL,
                max_potential_net_pnl TEXT NOT NULL,
                PRIMARY KEY (session_id, signal_id, close_time)
            )",
            [],
        )
        .map_err(|e| SinkError::Persist(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_summaries (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                params_json TEXT NOT NULL,
                summary_json TEXT NOT NULL,
                written_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .map_err(|e| SinkError::Persist(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ResultSink for SqliteResultSink {
    fn append_trade(&mut self, session_id: &str, trade: &TradeOutcome) -> Result<(), SinkError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO trades (
                session_id, signal_id, pair_symbol, direction, entry_time, entry_price,
                entry_commission, close_time, close_price, close_reason, gross_pnl,
                exit_commission, net_pnl, peak_favorable_price, max_potential_net_pnl
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                session_id,
                trade.signal_id as i64,
                trade.pair_symbol.as_str(),
                trade.direction.to_string(),
                trade.entry_time.to_rfc3339(),
                trade.entry_price,
                trade.entry_commission.inner().to_string(),
                trade.close_time.to_rfc3339(),
                trade.close_price,
                trade.close_reason.to_string(),
                trade.gross_pnl.inner().to_string(),
                trade.exit_commission.inner().to_string(),
                trade.net_pnl.inner().to_string(),
                trade.peak_favorable_price,
                trade.max_potential_net_pnl.inner().to_string(),
            ],
        )
        .map_err(|e| SinkError::Persist(e.to_string()))?;
        Ok(())
    }

    fn write_summary(
        &mut self,
        session_id: &str,
        user_id: &str,
        summary: &SessionSummary,
        params: &StrategyParams,
    ) -> Result<(), SinkError> {
        let summary_json =
            serde_json::to_string(summary).map_err(|e| SinkError::Summary(e.to_string()))?;
        let params_json =
            serde_json::to_string(params).map_err(|e| SinkError::Summary(e.to_string()))?;
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO session_summaries (session_id, user_id, params_json, summary_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, user_id, params_json, summary_json],
        )
        .map_err(|e| SinkError::Summary(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::CloseReason;
    use crate::types::{Direction, Money, Symbol};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn sample_trade() -> TradeOutcome {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        TradeOutcome {
            signal_id: 1,
            pair_symbol: Symbol::new("BTCUSDT"),
            direction: Direction::Long,
            entry_time: t,
            entry_price: 100.0,
            entry_commission: Money::ZERO,
            close_time: t,
            close_price: 101.0,
            close_reason: CloseReason::TakeProfit,
            gross_pnl: Money::from_f64(10.0),
            exit_commission: Money::ZERO,
            net_pnl: Money::from_f64(10.0),
            peak_favorable_price: 101.0,
            max_potential_net_pnl: Money::from_f64(10.0),
        }
    }

    fn sample_params() -> StrategyParams {
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
            simulation_end_time: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
            wave_interval_minutes: 15,
            phase1_hours: 24,
            breakeven_window_hours: 8,
            smart_loss_pct_per_hour: 0.5,
            forced_close_max_loss_fraction: 0.95,
        }
    }

    #[test]
    fn append_and_write_summary_round_trip() {
        let dir = std::env::temp_dir().join(format!("sqlite_sink_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let db_path = dir.join("results.sqlite3");
        let _ = std::fs::remove_file(&db_path);

        let mut sink = SqliteResultSink::open(&db_path).unwrap();
        sink.append_trade("s1", &sample_trade()).unwrap();
        // Idempotent: re-appending the same (session_id, signal_id, close_time) replaces, not duplicates.
        sink.append_trade("s1", &sample_trade()).unwrap();

        let summary = SessionSummary {
            session_id: "s1".to_string(),
            initial_capital: Money::from_f64(1000.0),
            final_equity: Money::from_f64(1010.0),
            realized_pnl: Money::from_f64(10.0),
            commission_paid: Money::ZERO,
            min_equity: Money::from_f64(1000.0),
            max_concurrent_positions: 1,
            max_drawdown_usd: Money::ZERO,
            max_drawdown_pct: 0.0,
            total_trades: 1,
            wins: 1,
            losses: 0,
            breakevens: 0,
            win_rate: 100.0,
            skipped: HashMap::new(),
        };
        sink.write_summary("s1", "user1", &summary, &sample_params())
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let trade_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM trades WHERE session_id = 's1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(trade_count, 1);
        let summary_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM session_summaries WHERE session_id = 's1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(summary_count, 1);
    }
}
