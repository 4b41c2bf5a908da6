//! Trail indicator: EMA "Trail1" plus the ATR dynamic trailing stop "Trail2"
//!
//! Trail2 ratchets toward price while the trend holds and jumps to a fresh
//! `trail1 ± atr * multiplier` offset when Trail1 crosses it. The continuation
//! test compares the *previous* Trail1 against the previous Trail2; a missing
//! previous value counts as 0.

use ta::indicators::ExponentialMovingAverage;
use ta::{Next, Reset};
use tracing::debug;

use crate::atr::AtrEngine;
use crate::error::{EngineError, EngineResult};
use crate::types::{BacktestConfig, Candle, IndicatorPoint};

#[derive(Debug, Clone)]
pub struct TrailIndicator {
    ema: ExponentialMovingAverage,
    atr: AtrEngine,
    atr_multiplier: f64,
    prev_trail1: Option<f64>,
    prev_trail2: Option<f64>,
}

impl TrailIndicator {
    pub fn new(ema_length: usize, atr_length: usize, atr_multiplier: f64) -> EngineResult<Self> {
        if !(atr_multiplier.is_finite() && atr_multiplier > 0.0) {
            return Err(EngineError::InvalidArgument(format!(
                "ATR multiplier must be positive, got {}",
                atr_multiplier
            )));
        }
        Ok(Self {
            ema: ExponentialMovingAverage::new(ema_length)?,
            atr: AtrEngine::new(atr_length)?,
            atr_multiplier,
            prev_trail1: None,
            prev_trail2: None,
        })
    }

    pub fn from_config(config: &BacktestConfig) -> EngineResult<Self> {
        Self::new(config.ema_length, config.atr_length, config.atr_multiplier)
    }

    pub fn step(&mut self, candle: &Candle) -> EngineResult<IndicatorPoint> {
        // Validation happens inside the ATR stage, before any state moves.
        let atr = self.atr.step_full(candle)?;
        let trail1 = self.ema.next(candle.close);

        let prev_trail1 = self.prev_trail1.unwrap_or(0.0);
        let prev_trail2 = self.prev_trail2.unwrap_or(0.0);
        let trail2 = next_trail2(trail1, prev_trail1, prev_trail2, atr.atr * self.atr_multiplier);

        self.prev_trail1 = Some(trail1);
        self.prev_trail2 = Some(trail2);

        Ok(IndicatorPoint {
            time: candle.time,
            trail1,
            trail2,
            atr: atr.atr,
            true_range: atr.true_range,
        })
    }

    /// Reset, then run a whole candle slice.
    pub fn compute(&mut self, candles: &[Candle]) -> EngineResult<Vec<IndicatorPoint>> {
        self.reset();
        let points = candles
            .iter()
            .map(|c| self.step(c))
            .collect::<EngineResult<Vec<_>>>()?;
        debug!(points = points.len(), "Computed trail indicator");
        Ok(points)
    }

    pub fn reset(&mut self) {
        self.ema.reset();
        self.atr.reset();
        self.prev_trail1 = None;
        self.prev_trail2 = None;
    }
}

fn next_trail2(trail1: f64, prev_trail1: f64, prev_trail2: f64, stop: f64) -> f64 {
    if trail1 > prev_trail2 {
        if prev_trail1 > prev_trail2 {
            prev_trail2.max(trail1 - stop)
        } else {
            trail1 - stop
        }
    } else if prev_trail1 < prev_trail2 {
        prev_trail2.min(trail1 + stop)
    } else {
        trail1 + stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TOL: f64 = 1e-9;

    fn candle(time: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(time, open, high, low, close, 1.0)
    }

    #[test]
    fn test_three_candle_trace() {
        // emaLength=2 (alpha=2/3), atrLength=2, multiplier=2
        let candles = [
            candle(0, 10.0, 11.0, 9.0, 10.0),
            candle(1, 10.0, 12.0, 9.0, 11.0),
            candle(2, 11.0, 11.0, 8.0, 9.0),
        ];
        let mut indicator = TrailIndicator::new(2, 2, 2.0).unwrap();
        let points = indicator.compute(&candles).unwrap();

        // Bar 0: tr=2, atr=2, trail1=10; trail1 > 0 and prev_trail1 (0) is not > 0,
        // so trail2 = 10 - 4 = 6.
        // Bar 1: tr=max(3,2,1)=3, atr=(2+3)/2=2.5, trail1=2/3*11+1/3*10=32/3;
        // uptrend continues: trail2 = max(6, 32/3 - 5) = 6.
        // Bar 2: tr=max(3,0,3)=3, atr=(2.5+3)/2=2.75, trail1=2/3*9+1/3*32/3=86/9;
        // still above 6 with prev_trail1 above 6: trail2 = max(6, 86/9 - 5.5) = 6.
        let expected = [
            (10.0, 6.0, 2.0),
            (32.0 / 3.0, 6.0, 2.5),
            (86.0 / 9.0, 6.0, 2.75),
        ];
        for (point, (trail1, trail2, atr)) in points.iter().zip(expected) {
            assert!((point.trail1 - trail1).abs() < TOL, "{point:?}");
            assert!((point.trail2 - trail2).abs() < TOL, "{point:?}");
            assert!((point.atr - atr).abs() < TOL, "{point:?}");
        }
        assert_eq!(points[2].time, 2);
    }

    #[test]
    fn test_trail2_ratchets_and_flips() {
        // Uptrend continuing: can only move up
        assert_eq!(next_trail2(10.0, 9.0, 8.0, 1.0), 9.0);
        assert_eq!(next_trail2(10.0, 9.8, 9.5, 1.0), 9.5);
        // Trend flipped up: fresh offset even if it is lower
        assert_eq!(next_trail2(10.0, 7.0, 8.0, 3.0), 7.0);
        // Downtrend continuing: can only move down
        assert_eq!(next_trail2(10.0, 11.0, 12.0, 1.0), 11.0);
        assert_eq!(next_trail2(10.0, 10.2, 10.5, 1.0), 10.5);
        // Trend flipped down
        assert_eq!(next_trail2(10.0, 13.0, 12.0, 3.0), 13.0);
        // Equal to prev trail2 falls into the down branch
        assert_eq!(next_trail2(12.0, 13.0, 12.0, 1.0), 13.0);
    }

    #[test]
    fn test_ema_bounded_by_observed_closes() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut indicator = TrailIndicator::new(30, 14, 2.0).unwrap();
        let mut price: f64 = 100.0;
        let mut lo = f64::MAX;
        let mut hi = f64::MIN;
        for i in 0..500 {
            let open = price;
            price = (price * (1.0 + rng.gen_range(-0.03..0.03))).max(1.0);
            let high = open.max(price) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(price) * (1.0 - rng.gen_range(0.0..0.01));
            lo = lo.min(price);
            hi = hi.max(price);
            let point = indicator.step(&candle(i, open, high, low, price)).unwrap();
            assert!(point.trail1 >= lo - TOL && point.trail1 <= hi + TOL);
            assert!(point.atr >= 0.0);
            assert!(point.true_range >= 0.0);
        }
    }

    #[test]
    fn test_compute_is_repeatable() {
        let candles: Vec<Candle> = (0..50)
            .map(|i| {
                let p = 100.0 + ((i as f64) * 0.7).sin() * 5.0;
                candle(i, p, p + 1.0, p - 1.0, p)
            })
            .collect();
        let mut indicator = TrailIndicator::new(5, 5, 1.5).unwrap();
        let first = indicator.compute(&candles).unwrap();
        let second = indicator.compute(&candles).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TrailIndicator::new(0, 14, 2.0).is_err());
        assert!(TrailIndicator::new(30, 0, 2.0).is_err());
        assert!(TrailIndicator::new(30, 14, 0.0).is_err());
    }

    #[test]
    fn test_bad_candle_rejected_before_state_changes() {
        let mut indicator = TrailIndicator::new(3, 3, 2.0).unwrap();
        let a = indicator.step(&candle(0, 10.0, 11.0, 9.0, 10.0)).unwrap();
        assert!(indicator.step(&candle(1, 10.0, 11.0, 9.0, f64::NAN)).is_err());
        let mut fresh = TrailIndicator::new(3, 3, 2.0).unwrap();
        fresh.step(&candle(0, 10.0, 11.0, 9.0, 10.0)).unwrap();
        let next = candle(1, 10.0, 12.0, 10.0, 11.0);
        assert_eq!(indicator.step(&next).unwrap(), fresh.step(&next).unwrap());
        assert_eq!(a.trail1, 10.0);
    }
}
