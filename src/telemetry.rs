//! Per-tick status snapshots and where they go.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

/// Engine state as shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngineStatus {
    Flat,
    Long,
    Short,
    /// Daily drawdown limit reached, new entries blocked
    Pause,
    /// Post-exit cooldown active
    Cooldown,
    /// Waiting for an order with an unknown outcome to resolve
    Reconcile,
    /// The last iteration failed
    Error,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineStatus::Flat => "FLAT",
            EngineStatus::Long => "LONG",
            EngineStatus::Short => "SHORT",
            EngineStatus::Pause => "PAUSE",
            EngineStatus::Cooldown => "COOLDOWN",
            EngineStatus::Reconcile => "RECONCILE",
            EngineStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Flat view of the engine after one decision.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub at: DateTime<Utc>,
    pub status: EngineStatus,
    pub price: Option<Decimal>,
    pub entry: Option<Decimal>,
    pub roe_pct: Option<Decimal>,
    pub tp1: Option<Decimal>,
    pub tp2: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub size: Option<Decimal>,
    pub trend: String,
    pub volatility: Decimal,
    /// Lowest and highest mid in the recent window
    pub range: Option<(Decimal, Decimal)>,
    pub event: String,
    pub equity: Decimal,
    pub drawdown_pct: Decimal,
}

fn opt(value: Option<Decimal>, dp: u32) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", dp as usize, v))
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "═══════════════════════════════════════")?;
        writeln!(f, "  {}  {}", self.status, self.at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "═══════════════════════════════════════")?;
        writeln!(f, "  Price:       {}", opt(self.price, 2))?;
        writeln!(f, "  Entry:       {}", opt(self.entry, 2))?;
        writeln!(f, "  Size:        {}", opt(self.size, 5))?;
        writeln!(f, "  ROE:         {}%", opt(self.roe_pct, 2))?;
        writeln!(f, "  TP1/TP2:     {}/{}", opt(self.tp1, 2), opt(self.tp2, 2))?;
        writeln!(f, "  Stop:        {}", opt(self.stop_loss, 2))?;
        writeln!(f, "  Trend:       {}", self.trend)?;
        writeln!(f, "  Volatility:  {:.2}", self.volatility)?;
        if let Some((low, high)) = self.range {
            writeln!(f, "  Range:       {:.2} - {:.2}", low, high)?;
        }
        writeln!(f, "  Equity:      ${:.2}", self.equity)?;
        writeln!(f, "  Drawdown:    {:.2}%", self.drawdown_pct)?;
        writeln!(f, "  Event:       {}", self.event)?;
        Ok(())
    }
}

/// Receives every snapshot. Purely observational.
pub trait TelemetrySink: Send {
    fn publish(&mut self, snapshot: &Snapshot);
}

/// Emits snapshots as structured log events.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish(&mut self, s: &Snapshot) {
        info!(
            status = %s.status,
            price = %opt(s.price, 2),
            entry = %opt(s.entry, 2),
            roe = %opt(s.roe_pct, 2),
            tp = %format!("{}/{}", opt(s.tp1, 2), opt(s.tp2, 2)),
            sl = %opt(s.stop_loss, 2),
            size = %opt(s.size, 5),
            trend = %s.trend,
            vol = %s.volatility.round_dp(2),
            range = %s.range.map_or_else(|| "-".to_string(), |(lo, hi)| format!("{lo}-{hi}")),
            equity = %s.equity.round_dp(2),
            dd_pct = %s.drawdown_pct.round_dp(2),
            "{}",
            s.event
        );
    }
}
