//! Trend and volatility estimation from the mid-price stream.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::EngineConfig;

/// Smoothing factor of the absolute-change volatility estimate.
const VOL_ALPHA: Decimal = dec!(0.2);

/// Fast/slow EMA trend plus a smoothed absolute price change.
#[derive(Debug, Clone)]
pub struct VolatilityRegime {
    window: VecDeque<Decimal>,
    capacity: usize,
    ema_fast: Option<Decimal>,
    ema_slow: Option<Decimal>,
    k_fast: Decimal,
    k_slow: Decimal,
    prev_price: Option<Decimal>,
    volatility: Decimal,
}

impl VolatilityRegime {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_periods(config.vol_window, config.ema_fast, config.ema_slow)
    }

    pub fn with_periods(window: usize, fast: u32, slow: u32) -> Self {
        let capacity = window.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            ema_fast: None,
            ema_slow: None,
            k_fast: smoothing(fast),
            k_slow: smoothing(slow),
            prev_price: None,
            volatility: Decimal::ZERO,
        }
    }

    /// Feed one mid price.
    pub fn update(&mut self, price: Decimal) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(price);

        self.ema_fast = Some(match self.ema_fast {
            Some(ema) => ema + self.k_fast * (price - ema),
            None => price,
        });
        self.ema_slow = Some(match self.ema_slow {
            Some(ema) => ema + self.k_slow * (price - ema),
            None => price,
        });

        let prev = self.prev_price.unwrap_or(price);
        let change = (price - prev).abs();
        self.volatility = VOL_ALPHA * change + (Decimal::ONE - VOL_ALPHA) * self.volatility;
        self.prev_price = Some(price);
    }

    /// Fast EMA above slow EMA. False until the first update.
    pub fn is_trend_up(&self) -> bool {
        match (self.ema_fast, self.ema_slow) {
            (Some(fast), Some(slow)) => fast > slow,
            _ => false,
        }
    }

    /// Smoothed absolute price change, never negative.
    pub fn volatility(&self) -> Decimal {
        self.volatility.max(Decimal::ZERO)
    }

    pub fn fast_ema(&self) -> Option<Decimal> {
        self.ema_fast
    }

    #[cfg(test)]
    pub fn slow_ema(&self) -> Option<Decimal> {
        self.ema_slow
    }

    /// Lowest and highest price in the recent window.
    pub fn range(&self) -> Option<(Decimal, Decimal)> {
        let first = *self.window.front()?;
        Some(
            self.window
                .iter()
                .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p))),
        )
    }

    #[cfg(test)]
    pub fn samples(&self) -> usize {
        self.window.len()
    }

    pub fn trend_label(&self) -> &'static str {
        if self.ema_fast.is_none() {
            "-"
        } else if self.is_trend_up() {
            "UP"
        } else {
            "DOWN"
        }
    }
}

fn smoothing(period: u32) -> Decimal {
    Decimal::TWO / Decimal::from(period.max(1) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_false_before_update() {
        let regime = VolatilityRegime::new(&EngineConfig::default());
        assert!(!regime.is_trend_up());
        assert_eq!(regime.volatility(), Decimal::ZERO);
        assert_eq!(regime.range(), None);
        assert_eq!(regime.trend_label(), "-");
    }

    #[test]
    fn test_first_update_seeds_state() {
        let mut regime = VolatilityRegime::with_periods(10, 3, 5);
        regime.update(dec!(100));
        assert_eq!(regime.fast_ema(), Some(dec!(100)));
        assert_eq!(regime.slow_ema(), Some(dec!(100)));
        assert_eq!(regime.volatility(), Decimal::ZERO);
        // Equal EMAs are not an uptrend
        assert!(!regime.is_trend_up());
    }

    #[test]
    fn test_volatility_smoothing() {
        let mut regime = VolatilityRegime::with_periods(10, 3, 5);
        regime.update(dec!(100));
        regime.update(dec!(110));
        assert_eq!(regime.volatility(), dec!(2));
        regime.update(dec!(110));
        assert_eq!(regime.volatility(), dec!(1.6));
    }

    #[test]
    fn test_rising_prices_trend_up() {
        let mut regime = VolatilityRegime::with_periods(10, 3, 8);
        for i in 0..20 {
            regime.update(dec!(100) + Decimal::from(i));
        }
        assert!(regime.is_trend_up());
        assert_eq!(regime.trend_label(), "UP");
    }

    #[test]
    fn test_emas_stay_within_observed_range() {
        let prices = [
            dec!(100), dec!(104.5), dec!(97.25), dec!(101), dec!(110), dec!(92), dec!(99.9),
            dec!(105.3), dec!(100.01), dec!(93.7),
        ];
        let mut regime = VolatilityRegime::with_periods(4, 3, 7);
        let (mut lo, mut hi) = (prices[0], prices[0]);
        for price in prices {
            lo = lo.min(price);
            hi = hi.max(price);
            regime.update(price);
            for ema in [regime.fast_ema().unwrap(), regime.slow_ema().unwrap()] {
                assert!(ema >= lo && ema <= hi, "ema {ema} outside [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut regime = VolatilityRegime::with_periods(3, 3, 5);
        for price in [dec!(90), dec!(120), dec!(100), dec!(105)] {
            regime.update(price);
        }
        assert_eq!(regime.samples(), 3);
        assert_eq!(regime.range(), Some((dec!(100), dec!(120))));
    }
}
