//! Engine configuration.

use std::str::FromStr;

use anyhow::{ensure, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::api::TimeInForce;

/// Longest cooldown the engine accepts (one week).
const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 60 * 60;

/// How entry orders are priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Crossing limit priced through the mid by `entry_slippage_pct`
    Taker,
    /// Resting limit priced away from the mid by `maker_offset_pct`
    Maker,
}

impl FromStr for EntryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "taker" => Ok(Self::Taker),
            "maker" | "maker_chase" => Ok(Self::Maker),
            other => Err(format!("unknown entry mode '{other}' (expected taker or maker)")),
        }
    }
}

/// What happens to the high-water mark at calendar-day rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighWaterPolicy {
    /// High-water mark restarts from the current equity each day
    Reset,
    /// High-water mark carries over across days.
    ///
    /// With the high-water drawdown basis a breach then never clears on its
    /// own: equity does not move while flat.
    Keep,
}

impl FromStr for HighWaterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reset" => Ok(Self::Reset),
            "keep" => Ok(Self::Keep),
            other => Err(format!("unknown high-water policy '{other}' (expected reset or keep)")),
        }
    }
}

/// Reference used to measure the daily drawdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownBasis {
    /// Decline of equity from the high-water mark
    HighWater,
    /// Realized loss of the current day relative to the high-water mark
    DayLoss,
}

impl FromStr for DrawdownBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high_water" | "highwater" => Ok(Self::HighWater),
            "day_loss" | "dayloss" => Ok(Self::DayLoss),
            other => Err(format!("unknown drawdown basis '{other}' (expected high_water or day_loss)")),
        }
    }
}

/// Configuration for the position engine, fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Venue coin name (e.g. "BTC")
    pub symbol: String,

    /// Leverage used to translate price moves into ROE
    pub leverage: Decimal,

    // === Targets ===
    /// Take-profit floor in ROE percent
    pub tp_floor_roe_pct: Decimal,

    /// Stop-loss floor in ROE percent
    pub sl_floor_roe_pct: Decimal,

    /// Take-profit distance in volatility units
    pub tp_vol_mult: Decimal,

    /// Stop-loss distance in volatility units
    pub sl_vol_mult: Decimal,

    /// Extra volatility units between TP1 and TP2
    pub tp2_extra_mult: Decimal,

    /// Minimum reward:risk ratio enforced on every plan
    pub rr_min: Decimal,

    // === Regime ===
    /// Fast EMA period (samples)
    pub ema_fast: u32,

    /// Slow EMA period (samples)
    pub ema_slow: u32,

    /// Number of recent prices kept for range reporting
    pub vol_window: usize,

    // === Position management ===
    /// ROE percent at which the trailing stop starts ratcheting
    pub trail_start_roe: Decimal,

    /// ROE percent per trailing step
    pub trail_step_pct: Decimal,

    /// Trailing stop distance from price in volatility units
    pub trail_buffer_vol_mult: Decimal,

    /// Fraction of the position closed at TP1 (0.0 to 1.0)
    pub partial_ratio: Decimal,

    /// Pause after a partial-exit submission before evaluating full exits
    pub partial_settle_ms: u64,

    // === Sizing ===
    /// Percent of equity risked per trade
    pub risk_per_trade_pct: Decimal,

    /// Maximum position size in base units
    pub max_size: Decimal,

    /// Minimum position size in base units
    pub min_size: Decimal,

    // === Ledger ===
    /// Starting equity in quote currency
    pub start_equity: Decimal,

    /// Maker fee in basis points
    pub maker_bps: Decimal,

    /// Taker fee in basis points
    pub taker_bps: Decimal,

    /// Daily drawdown percent that pauses new entries
    pub daily_dd_limit_pct: Decimal,

    /// How the daily drawdown is measured
    pub drawdown_basis: DrawdownBasis,

    /// Whether the high-water mark resets at day rollover
    pub high_water_on_day_roll: HighWaterPolicy,

    // === Cooldowns ===
    /// Cooldown after a stop-loss exit (seconds)
    pub cooldown_secs: u64,

    /// Fraction of `cooldown_secs` applied after a take-profit exit
    pub profit_cooldown_fraction: Decimal,

    /// Lower bound for any post-exit cooldown (seconds)
    pub min_cooldown_secs: u64,

    // === Entry filters ===
    /// Allow long entries
    pub allow_long: bool,

    /// Allow short entries
    pub allow_short: bool,

    /// Enter regardless of the EMA trend
    pub skip_trend: bool,

    /// Allow counter-trend entries when price is on the entry side of the fast EMA
    pub use_pullback: bool,

    // === Order pricing ===
    /// Entry pricing mode
    pub entry_mode: EntryMode,

    /// Crossing offset for taker entries (fraction of mid)
    pub entry_slippage_pct: Decimal,

    /// Crossing offset for taker exits (fraction of mid)
    pub exit_cross_pct: Decimal,

    /// Resting offset for maker orders (fraction of mid)
    pub maker_offset_pct: Decimal,

    /// Exits cross the book instead of resting
    pub exit_taker: bool,

    /// Time-in-force for taker entries
    pub entry_tif: TimeInForce,

    /// Time-in-force for taker exits
    pub exit_tif: TimeInForce,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC".to_string(),
            leverage: dec!(20),

            // Targets
            tp_floor_roe_pct: dec!(2),
            sl_floor_roe_pct: dec!(1),
            tp_vol_mult: dec!(1.8),
            sl_vol_mult: dec!(1.0),
            tp2_extra_mult: dec!(0.8),
            rr_min: dec!(1.2),

            // Regime
            ema_fast: 20,
            ema_slow: 60,
            vol_window: 60,

            // Position management
            trail_start_roe: dec!(1.2),
            trail_step_pct: dec!(0.4),
            trail_buffer_vol_mult: dec!(0.5),
            partial_ratio: dec!(0.5),
            partial_settle_ms: 400,

            // Sizing
            risk_per_trade_pct: dec!(0.4),
            max_size: dec!(0.01),
            min_size: dec!(0.001),

            // Ledger
            start_equity: dec!(5000),
            maker_bps: dec!(0),
            taker_bps: dec!(5),
            daily_dd_limit_pct: dec!(3),
            drawdown_basis: DrawdownBasis::HighWater,
            high_water_on_day_roll: HighWaterPolicy::Reset,

            // Cooldowns
            cooldown_secs: 0,
            profit_cooldown_fraction: dec!(0.2),
            min_cooldown_secs: 5,

            // Entry filters
            allow_long: true,
            allow_short: false,
            skip_trend: false,
            use_pullback: true,

            // Order pricing
            entry_mode: EntryMode::Taker,
            entry_slippage_pct: dec!(0.002),
            exit_cross_pct: dec!(0.002),
            maker_offset_pct: dec!(0.0002),
            exit_taker: true,
            entry_tif: TimeInForce::Gtc,
            exit_tif: TimeInForce::Ioc,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot trade safely with.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.symbol.trim().is_empty(), "symbol must not be empty");
        ensure!(self.leverage > Decimal::ZERO, "leverage must be positive, got {}", self.leverage);
        ensure!(
            self.tp_floor_roe_pct > Decimal::ZERO && self.sl_floor_roe_pct > Decimal::ZERO,
            "TP/SL ROE floors must be positive (tp={}, sl={})",
            self.tp_floor_roe_pct,
            self.sl_floor_roe_pct
        );
        ensure!(
            self.tp_vol_mult >= Decimal::ZERO
                && self.sl_vol_mult >= Decimal::ZERO
                && self.trail_buffer_vol_mult >= Decimal::ZERO,
            "volatility multipliers must not be negative"
        );
        ensure!(self.tp2_extra_mult > Decimal::ZERO, "tp2_extra_mult must be positive");
        ensure!(self.rr_min > Decimal::ZERO, "rr_min must be positive, got {}", self.rr_min);
        ensure!(
            self.ema_fast > 0 && self.ema_slow > 0 && self.vol_window > 0,
            "EMA periods and volatility window must be at least 1"
        );
        ensure!(self.trail_step_pct > Decimal::ZERO, "trail_step_pct must be positive");
        ensure!(
            self.partial_ratio > Decimal::ZERO && self.partial_ratio < Decimal::ONE,
            "partial_ratio must be between 0 and 1 exclusive, got {}",
            self.partial_ratio
        );
        ensure!(self.risk_per_trade_pct > Decimal::ZERO, "risk_per_trade_pct must be positive");
        ensure!(self.min_size > Decimal::ZERO, "min_size must be positive");
        ensure!(
            self.max_size >= self.min_size,
            "max_size ({}) must not be below min_size ({})",
            self.max_size,
            self.min_size
        );
        ensure!(self.start_equity > Decimal::ZERO, "start_equity must be positive");
        ensure!(
            self.maker_bps >= Decimal::ZERO && self.taker_bps >= Decimal::ZERO,
            "fee rates must not be negative"
        );
        ensure!(self.daily_dd_limit_pct > Decimal::ZERO, "daily_dd_limit_pct must be positive");
        ensure!(self.min_cooldown_secs > 0, "min_cooldown_secs must be at least 1");
        for (name, secs) in [
            ("cooldown_secs", self.cooldown_secs),
            ("min_cooldown_secs", self.min_cooldown_secs),
        ] {
            ensure!(
                secs <= MAX_COOLDOWN_SECS,
                "{name} must not exceed {MAX_COOLDOWN_SECS}, got {secs}"
            );
        }
        ensure!(
            self.profit_cooldown_fraction >= Decimal::ZERO && self.profit_cooldown_fraction <= Decimal::ONE,
            "profit_cooldown_fraction must be in [0, 1], got {}",
            self.profit_cooldown_fraction
        );
        ensure!(self.allow_long || self.allow_short, "at least one of allow_long/allow_short must be set");
        for (name, offset) in [
            ("entry_slippage_pct", self.entry_slippage_pct),
            ("exit_cross_pct", self.exit_cross_pct),
            ("maker_offset_pct", self.maker_offset_pct),
        ] {
            ensure!(
                offset >= Decimal::ZERO && offset < Decimal::ONE,
                "{name} must be in [0, 1), got {offset}"
            );
        }
        Ok(())
    }

    /// A drawdown pause under this configuration lasts until restart.
    pub fn pause_is_sticky(&self) -> bool {
        self.high_water_on_day_roll == HighWaterPolicy::Keep && self.drawdown_basis == DrawdownBasis::HighWater
    }

    /// Cooldown armed after a take-profit exit.
    ///
    /// Never longer than the full cooldown, whatever the fraction.
    pub fn profit_cooldown(&self) -> Duration {
        let full_ms = secs_to_ms(self.cooldown_secs);
        let scaled_ms = (Decimal::from(self.cooldown_secs) * self.profit_cooldown_fraction * dec!(1000))
            .to_i64()
            .map_or(full_ms, |ms| ms.min(full_ms));
        let floor_ms = self.min_cooldown_ms();
        Duration::milliseconds(scaled_ms.max(floor_ms))
    }

    /// Cooldown armed after a stop-loss exit. Never shorter than the profit cooldown.
    pub fn stop_cooldown(&self) -> Duration {
        let full = Duration::milliseconds(secs_to_ms(self.cooldown_secs));
        full.max(self.profit_cooldown())
    }

    fn min_cooldown_ms(&self) -> i64 {
        secs_to_ms(self.min_cooldown_secs)
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}
