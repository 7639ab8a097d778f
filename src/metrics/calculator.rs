//! Session statistics: order counters, closed trades and return statistics.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::models::{ClosedTrade, ExitReason};

/// Counters and realized results for the running process.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub entries: u32,
    pub partials: u32,
    pub take_profits: u32,
    pub stop_losses: u32,
    pub rejected_orders: u32,
    pub unknown_orders: u32,
    pub fees_paid: Decimal,
    pub realized_pnl: Decimal,
    closed: Vec<ClosedTrade>,
}

impl SessionStats {
    pub fn record_entry(&mut self, fee: Decimal) {
        self.entries += 1;
        self.fees_paid += fee;
    }

    pub fn record_close(&mut self, trade: ClosedTrade) {
        match trade.reason {
            ExitReason::Partial => self.partials += 1,
            ExitReason::TakeProfit => self.take_profits += 1,
            ExitReason::StopLoss => self.stop_losses += 1,
        }
        self.realized_pnl += trade.pnl;
        self.closed.push(trade);
    }

    pub fn record_rejected(&mut self) {
        self.rejected_orders += 1;
    }

    pub fn record_unknown(&mut self) {
        self.unknown_orders += 1;
    }

    /// Full exits (take-profit or stop-loss).
    pub fn round_trips(&self) -> u32 {
        self.take_profits + self.stop_losses
    }

    /// Share of booked closes with positive P&L.
    pub fn win_rate(&self) -> f64 {
        if self.closed.is_empty() {
            return 0.0;
        }
        let wins = self.closed.iter().filter(|t| t.is_win()).count();
        wins as f64 / self.closed.len() as f64
    }

    /// Net returns (percent) of every booked close.
    pub fn net_returns(&self) -> Vec<f64> {
        self.closed
            .iter()
            .filter_map(|t| t.net_pct.to_f64())
            .collect()
    }

    /// Mean and standard deviation of net returns. Needs two closes.
    pub fn return_stats(&self) -> Option<(f64, f64)> {
        let returns = self.net_returns();
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.clone().mean();
        let std_dev = returns.std_dev();
        Some((mean, std_dev))
    }

    /// Largest peak-to-trough decline of cumulative realized P&L.
    pub fn max_drawdown(&self) -> Decimal {
        let mut equity = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;
        for trade in &self.closed {
            equity += trade.pnl;
            peak = peak.max(equity);
            max_dd = max_dd.max(peak - equity);
        }
        max_dd
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Session Statistics ===")?;
        writeln!(f, "Entries:         {}", self.entries)?;
        writeln!(f, "Round trips:     {} ({} TP / {} SL, {} partial)",
            self.round_trips(), self.take_profits, self.stop_losses, self.partials)?;
        writeln!(f, "Orders:          {} rejected, {} unknown", self.rejected_orders, self.unknown_orders)?;
        writeln!(f, "Realized P&L:    ${:.2}", self.realized_pnl)?;
        writeln!(f, "Entry fees:      ${:.4}", self.fees_paid)?;
        writeln!(f, "Win rate:        {:.1}%", self.win_rate() * 100.0)?;
        writeln!(f, "Max drawdown:    ${:.2}", self.max_drawdown())?;
        if let Some((mean, std_dev)) = self.return_stats() {
            writeln!(f, "Net return:      {:.4}% mean, {:.4}% std dev", mean, std_dev)?;
        }
        Ok(())
    }
}
