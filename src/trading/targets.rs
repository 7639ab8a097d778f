//! Take-profit and stop-loss planning.
//!
//! Targets combine an ROE floor with volatility-scaled distances, whichever is
//! wider, and the take-profit is stretched until the plan meets the minimum
//! reward:risk ratio.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::Side;

use super::EngineConfig;

/// Lower bound on the risk distance used in the reward:risk ratio.
const MIN_RISK: Decimal = dec!(0.000000001);

/// Planned exit prices for a hypothetical entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetPlan {
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
}

impl TargetPlan {
    /// Reward distance over risk distance.
    pub fn reward_risk(&self, entry: Decimal) -> Decimal {
        let risk = (entry - self.stop_loss).abs().max(MIN_RISK);
        (self.take_profit - entry).abs() / risk
    }
}

/// Full plan for an entry, including the two-stage take-profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionPlan {
    pub side: Side,
    pub entry: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub stop_loss: Decimal,
}

/// Computes exit targets from the entry price, side and volatility.
#[derive(Debug, Clone)]
pub struct TargetPlanner {
    leverage: Decimal,
    tp_floor_roe_pct: Decimal,
    sl_floor_roe_pct: Decimal,
    tp_vol_mult: Decimal,
    sl_vol_mult: Decimal,
    tp2_extra_mult: Decimal,
    rr_min: Decimal,
}

impl TargetPlanner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            leverage: config.leverage,
            tp_floor_roe_pct: config.tp_floor_roe_pct,
            sl_floor_roe_pct: config.sl_floor_roe_pct,
            tp_vol_mult: config.tp_vol_mult,
            sl_vol_mult: config.sl_vol_mult,
            tp2_extra_mult: config.tp2_extra_mult,
            rr_min: config.rr_min,
        }
    }

    /// Targets implied by the ROE floors alone.
    pub fn floor(&self, entry: Decimal, side: Side) -> TargetPlan {
        let tp_ratio = self.tp_floor_roe_pct / (dec!(100) * self.leverage);
        let sl_ratio = self.sl_floor_roe_pct / (dec!(100) * self.leverage);
        let sign = side.sign();
        TargetPlan {
            take_profit: entry * (Decimal::ONE + sign * tp_ratio),
            stop_loss: entry * (Decimal::ONE - sign * sl_ratio),
        }
    }

    /// Combine floor and volatility targets, then enforce the minimum reward:risk.
    pub fn plan(&self, entry: Decimal, side: Side, volatility: Decimal) -> TargetPlan {
        let floor = self.floor(entry, side);
        let vol = volatility.max(Decimal::ZERO);
        let sign = side.sign();
        let tp_dyn = entry + sign * vol * self.tp_vol_mult;
        let sl_dyn = entry - sign * vol * self.sl_vol_mult;

        let (take_profit, mut stop_loss) = match side {
            Side::Long => (floor.take_profit.max(tp_dyn), floor.stop_loss.min(sl_dyn)),
            Side::Short => (floor.take_profit.min(tp_dyn), floor.stop_loss.max(sl_dyn)),
        };

        let wrong_side = match side {
            Side::Long => stop_loss >= entry,
            Side::Short => stop_loss <= entry,
        };
        if wrong_side {
            stop_loss = floor.stop_loss;
        }

        self.enforce_reward_risk(entry, side, TargetPlan { take_profit, stop_loss })
    }

    /// Plan with both take-profit stages for an entry at `entry`.
    pub fn plan_position(&self, entry: Decimal, side: Side, volatility: Decimal) -> PositionPlan {
        let plan = self.plan(entry, side, volatility);
        let vol = volatility.max(Decimal::ZERO);
        let sign = side.sign();

        let vol_target = entry + sign * vol * self.tp_vol_mult;
        let tp1 = match side {
            Side::Long => plan.take_profit.max(vol_target),
            Side::Short => plan.take_profit.min(vol_target),
        };

        // A zero-volatility plan still needs tp2 strictly beyond tp1
        let extra = if vol > Decimal::ZERO {
            vol * self.tp2_extra_mult
        } else {
            (tp1 - entry).abs() * self.tp2_extra_mult
        };
        let tp2 = tp1 + sign * extra;

        PositionPlan {
            side,
            entry,
            tp1,
            tp2,
            stop_loss: plan.stop_loss,
        }
    }

    fn enforce_reward_risk(&self, entry: Decimal, side: Side, plan: TargetPlan) -> TargetPlan {
        let risk = (side.sign() * (entry - plan.stop_loss)).max(MIN_RISK);
        let reward = side.sign() * (plan.take_profit - entry);
        if reward / risk < self.rr_min {
            TargetPlan {
                take_profit: entry + side.sign() * self.rr_min * risk,
                stop_loss: plan.stop_loss,
            }
        } else {
            plan
        }
    }
}
