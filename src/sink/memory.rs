//! In-memory [`ResultSink`], sufficient for unit and integration tests (spec §4.6: "in tests
//! a memory sink suffices").

use std::collections::HashMap;

use crate::error::SinkError;
use crate::interfaces::ResultSink;
use crate::params::StrategyParams;
use crate::session::SessionSummary;
use crate::trade::TradeOutcome;

#[derive(Debug, Default)]
pub struct MemoryResultSink {
    pub trades: HashMap<String, Vec<TradeOutcome>>,
    pub summaries: HashMap<String, SessionSummary>,
    pub summary_user_ids: HashMap<String, String>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades_for(&self, session_id: &str) -> &[TradeOutcome] {
        self.trades.get(session_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl ResultSink for MemoryResultSink {
    fn append_trade(&mut self, session_id: &str, trade: &TradeOutcome) -> Result<(), SinkError> {
        let rows = self.trades.entry(session_id.to_string()).or_default();
        if !rows
            .iter()
            .any(|t| t.signal_id == trade.signal_id && t.close_time == trade.close_time)
        {
            rows.push(trade.clone());
        }
        Ok(())
    }

    fn write_summary(
        &mut self,
        session_id: &str,
        user_id: &str,
        summary: &SessionSummary,
        _params: &StrategyParams,
    ) -> Result<(), SinkError> {
        self.summaries.insert(session_id.to_string(), summary.clone());
        self.summary_user_ids
            .insert(session_id.to_string(), user_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::CloseReason;
    use crate::types::{Direction, Money, Symbol};
    use chrono::{TimeZone, Utc};

    fn trade(signal_id: u64) -> TradeOutcome {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        TradeOutcome {
            signal_id,
            pair_symbol: Symbol::new("BTCUSDT"),
            direction: Direction::Long,
            entry_time: t,
            entry_price: 100.0,
            entry_commission: Money::ZERO,
            close_time: t,
            close_price: 101.0,
            close_reason: CloseReason::TakeProfit,
            gross_pnl: Money::ZERO,
            exit_commission: Money::ZERO,
            net_pnl: Money::ZERO,
            peak_favorable_price: 101.0,
            max_potential_net_pnl: Money::ZERO,
        }
    }

    #[test]
    fn append_trade_is_idempotent_on_signal_and_close_time() {
        let mut sink = MemoryResultSink::new();
        sink.append_trade("s1", &trade(1)).unwrap();
        sink.append_trade("s1", &trade(1)).unwrap();
        assert_eq!(sink.trades_for("s1").len(), 1);
    }

    #[test]
    fn trades_are_scoped_per_session() {
        let mut sink = MemoryResultSink::new();
        sink.append_trade("s1", &trade(1)).unwrap();
        sink.append_trade("s2", &trade(1)).unwrap();
        assert_eq!(sink.trades_for("s1").len(), 1);
        assert_eq!(sink.trades_for("s2").len(), 1);
    }
}
