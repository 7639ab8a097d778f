//! Entry filters and in-position rules: ROE, trailing stop, partial and full exits.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{ExitReason, Position, Side};

use super::{EngineConfig, VolatilityRegime};

/// Result of entry validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryValidation {
    pub allowed: bool,
    pub reason: String,
    pub side: Option<Side>,
}

impl EntryValidation {
    pub fn allow(side: Side, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            side: Some(side),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            side: None,
        }
    }
}

/// A trailing-stop ratchet to apply to the open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailUpdate {
    /// New trailing step count
    pub step: u32,
    /// Tightened stop, if the candidate improved on the current one
    pub stop: Option<Decimal>,
}

/// Rule set shared by entry and in-position decisions.
#[derive(Debug, Clone)]
pub struct Strategy {
    leverage: Decimal,
    allow_long: bool,
    allow_short: bool,
    skip_trend: bool,
    use_pullback: bool,
    trail_start_roe: Decimal,
    trail_step_pct: Decimal,
    trail_buffer_vol_mult: Decimal,
}

impl Strategy {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            leverage: config.leverage,
            allow_long: config.allow_long,
            allow_short: config.allow_short,
            skip_trend: config.skip_trend,
            use_pullback: config.use_pullback,
            trail_start_roe: config.trail_start_roe,
            trail_step_pct: config.trail_step_pct,
            trail_buffer_vol_mult: config.trail_buffer_vol_mult,
        }
    }

    /// Decide whether to open a position at `price`. Long wins when both sides qualify.
    pub fn evaluate_entry(&self, price: Decimal, regime: &VolatilityRegime) -> EntryValidation {
        let volatility = regime.volatility();
        if volatility <= Decimal::ZERO {
            return EntryValidation::deny("wait regime: no volatility yet");
        }

        let trend_up = regime.is_trend_up();
        let fast = regime.fast_ema();
        let pullback_long = self.use_pullback && fast.is_some_and(|ema| price > ema);
        let pullback_short = self.use_pullback && fast.is_some_and(|ema| price < ema);

        if self.allow_long && (trend_up || self.skip_trend || pullback_long) {
            let reason = if trend_up {
                "trend up"
            } else if self.skip_trend {
                "trend filter off"
            } else {
                "pullback above fast EMA"
            };
            return EntryValidation::allow(Side::Long, reason);
        }

        if self.allow_short && (!trend_up || self.skip_trend || pullback_short) {
            let reason = if !trend_up {
                "trend down"
            } else if self.skip_trend {
                "trend filter off"
            } else {
                "pullback below fast EMA"
            };
            return EntryValidation::allow(Side::Short, reason);
        }

        EntryValidation::deny("wait regime")
    }

    /// Leveraged return on margin at `price`, percent.
    pub fn roe_pct(&self, position: &Position, price: Decimal) -> Decimal {
        if position.entry.is_zero() {
            return Decimal::ZERO;
        }
        position.side.sign() * (price - position.entry) / position.entry * self.leverage * dec!(100)
    }

    /// Compute a trailing-stop ratchet, if a new step has been reached.
    ///
    /// The step counter advances even when the candidate stop would not tighten.
    pub fn trailing_update(&self, position: &Position, price: Decimal, volatility: Decimal) -> Option<TrailUpdate> {
        let roe = self.roe_pct(position, price);
        if roe < self.trail_start_roe {
            return None;
        }

        let step = ((roe - self.trail_start_roe) / self.trail_step_pct)
            .floor()
            .to_u32()
            .unwrap_or(u32::MAX);
        if step <= position.trail_steps {
            return None;
        }

        let buffer = volatility.max(Decimal::ZERO) * self.trail_buffer_vol_mult;
        let candidate = match position.side {
            Side::Long => position.stop_loss.max(position.entry).max(price - buffer),
            Side::Short => position.stop_loss.min(position.entry).min(price + buffer),
        };
        let tightens = match position.side {
            Side::Long => candidate > position.stop_loss,
            Side::Short => candidate < position.stop_loss,
        };

        Some(TrailUpdate {
            step,
            stop: tightens.then_some(candidate),
        })
    }

    /// Whether the one-shot partial exit should fire.
    pub fn partial_due(&self, position: &Position, price: Decimal) -> bool {
        !position.partial_done && position.reached(price, position.tp1)
    }

    /// Full-exit check. The final target is checked before the stop.
    pub fn check_exit(&self, position: &Position, price: Decimal) -> Option<ExitReason> {
        if position.reached(price, position.tp2) {
            Some(ExitReason::TakeProfit)
        } else if position.stopped(price) {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }
}
