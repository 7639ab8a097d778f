//! Equity ledger: realized P&L, fees, high-water mark and daily drawdown.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use super::{DrawdownBasis, EngineConfig, HighWaterPolicy};

/// Result of booking a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedTrade {
    /// Realized P&L in quote currency
    pub pnl: Decimal,
    /// Price move net of fees, percent
    pub net_pct: Decimal,
}

/// Tracks equity for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct EquityLedger {
    equity: Decimal,
    high_water: Decimal,
    day: NaiveDate,
    day_pnl: Decimal,
    maker_bps: Decimal,
    taker_bps: Decimal,
    daily_dd_limit_pct: Decimal,
    basis: DrawdownBasis,
    day_roll: HighWaterPolicy,
}

impl EquityLedger {
    pub fn new(config: &EngineConfig, today: NaiveDate) -> Self {
        if config.pause_is_sticky() {
            warn!(
                limit_pct = %config.daily_dd_limit_pct,
                "High-water mark kept across days: a drawdown pause will hold until restart"
            );
        }
        Self {
            equity: config.start_equity,
            high_water: config.start_equity,
            day: today,
            day_pnl: Decimal::ZERO,
            maker_bps: config.maker_bps,
            taker_bps: config.taker_bps,
            daily_dd_limit_pct: config.daily_dd_limit_pct,
            basis: config.drawdown_basis,
            day_roll: config.high_water_on_day_roll,
        }
    }

    /// Start a new day if `today` differs from the current day key.
    ///
    /// Returns true when a rollover happened.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        if today == self.day {
            return false;
        }

        info!(
            from = %self.day,
            to = %today,
            day_pnl = %self.day_pnl.round_dp(2),
            equity = %self.equity.round_dp(2),
            "Day rollover"
        );

        self.day = today;
        self.day_pnl = Decimal::ZERO;
        if self.day_roll == HighWaterPolicy::Reset {
            self.high_water = self.equity;
        }
        true
    }

    /// Fee rate in basis points for a leg filled `taker_ratio` as taker.
    pub fn fee_bps(&self, taker_ratio: Decimal) -> Decimal {
        let ratio = taker_ratio.clamp(Decimal::ZERO, Decimal::ONE);
        self.maker_bps * (Decimal::ONE - ratio) + self.taker_bps * ratio
    }

    /// Book a realized close.
    ///
    /// # Arguments
    /// * `notional` - Unlevered value of the closed size at entry
    /// * `realized_pct` - Price move captured, percent (positive is a gain)
    /// * `taker_ratio` - Share of the exit leg filled as taker
    pub fn book_trade(&mut self, notional: Decimal, realized_pct: Decimal, taker_ratio: Decimal) -> BookedTrade {
        let net_pct = realized_pct - self.fee_bps(taker_ratio) / dec!(100);
        let pnl = notional * net_pct / dec!(100);
        self.apply(pnl);
        BookedTrade { pnl, net_pct }
    }

    /// Charge the fee of an opening leg. Returns the fee amount.
    pub fn charge_fee(&mut self, notional: Decimal, taker_ratio: Decimal) -> Decimal {
        let fee = notional * self.fee_bps(taker_ratio) / dec!(10000);
        self.apply(-fee);
        fee
    }

    fn apply(&mut self, pnl: Decimal) {
        self.equity += pnl;
        self.day_pnl += pnl;
        if self.equity > self.high_water {
            self.high_water = self.equity;
        }
    }

    /// Current drawdown in percent, measured per the configured basis.
    pub fn daily_dd_pct(&self) -> Decimal {
        match self.basis {
            DrawdownBasis::HighWater => {
                if self.high_water <= Decimal::ZERO {
                    return Decimal::ZERO;
                }
                (self.high_water - self.equity) / self.high_water * dec!(100)
            }
            DrawdownBasis::DayLoss => {
                if self.day_pnl >= Decimal::ZERO {
                    return Decimal::ZERO;
                }
                -self.day_pnl / self.high_water.max(Decimal::ONE) * dec!(100)
            }
        }
    }

    /// New entries are blocked once the drawdown reaches the daily limit.
    pub fn is_paused(&self) -> bool {
        self.daily_dd_pct() >= self.daily_dd_limit_pct
    }

    pub fn equity(&self) -> Decimal {
        self.equity
    }

    pub fn high_water(&self) -> Decimal {
        self.high_water
    }

    pub fn day_pnl(&self) -> Decimal {
        self.day_pnl
    }
}
