//! Streaming True Range / Average True Range
//!
//! True Range comes from `ta`; the average uses Wilder smoothing (RMA) rather
//! than the EMA `ta::indicators::AverageTrueRange` applies, so the first ATR
//! equals the first True Range and each later value is
//! `(atr_prev * (N - 1) + tr) / N`.

use ta::indicators::TrueRange;
use ta::{Next, Reset};

use crate::error::{EngineError, EngineResult};
use crate::types::Candle;

/// Output of one ATR step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrOutput {
    pub true_range: f64,
    pub atr: f64,
}

#[derive(Debug, Clone)]
pub struct AtrEngine {
    length: usize,
    true_range: TrueRange,
    atr: Option<f64>,
}

impl AtrEngine {
    pub fn new(length: usize) -> EngineResult<Self> {
        if length == 0 {
            return Err(EngineError::InvalidArgument(
                "ATR length must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            length,
            true_range: TrueRange::new(),
            atr: None,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Current ATR, `None` before the first candle.
    pub fn value(&self) -> Option<f64> {
        self.atr
    }

    pub fn step(&mut self, candle: &Candle) -> EngineResult<f64> {
        Ok(self.step_full(candle)?.atr)
    }

    pub fn step_full(&mut self, candle: &Candle) -> EngineResult<AtrOutput> {
        candle.validate()?;

        let tr = self.true_range.next(candle);
        let n = self.length as f64;
        let atr = match self.atr {
            None => tr,
            Some(prev) => (prev * (n - 1.0) + tr) / n,
        };
        self.atr = Some(atr);

        Ok(AtrOutput {
            true_range: tr,
            atr,
        })
    }

    pub fn reset(&mut self) {
        self.true_range.reset();
        self.atr = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(time, open, high, low, close, 1.0)
    }

    #[test]
    fn test_first_true_range_is_high_minus_low() {
        let mut engine = AtrEngine::new(14).unwrap();
        let out = engine.step_full(&candle(0, 10.0, 11.0, 9.0, 10.0)).unwrap();
        assert_eq!(out.true_range, 2.0);
        assert_eq!(out.atr, 2.0);
    }

    #[test]
    fn test_gap_uses_previous_close() {
        let mut engine = AtrEngine::new(2).unwrap();
        engine.step(&candle(0, 10.0, 11.0, 9.0, 10.0)).unwrap();
        // Gap up: |high - prev_close| = 5 dominates high - low = 1
        let out = engine.step_full(&candle(1, 14.0, 15.0, 14.0, 14.5)).unwrap();
        assert_eq!(out.true_range, 5.0);
        assert!((out.atr - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_wilder_smoothing() {
        let mut engine = AtrEngine::new(4).unwrap();
        let mut expected = None::<f64>;
        let bars = [
            candle(0, 10.0, 12.0, 9.0, 11.0),
            candle(1, 11.0, 11.5, 10.0, 10.5),
            candle(2, 10.5, 13.0, 10.5, 12.5),
            candle(3, 12.5, 12.5, 11.0, 11.5),
        ];
        let trs = [3.0, 1.5, 2.5, 1.5];
        for (bar, tr) in bars.iter().zip(trs) {
            let atr = engine.step(bar).unwrap();
            let want = match expected {
                None => tr,
                Some(prev) => (prev * 3.0 + tr) / 4.0,
            };
            assert!((atr - want).abs() < 1e-12);
            expected = Some(want);
        }
    }

    #[test]
    fn test_invalid_candle_leaves_state_untouched() {
        let mut engine = AtrEngine::new(3).unwrap();
        engine.step(&candle(0, 10.0, 11.0, 9.0, 10.0)).unwrap();
        let before = engine.value();
        let bad = candle(1, 10.0, 9.0, 11.0, 10.0);
        assert!(matches!(engine.step(&bad), Err(EngineError::InvalidInput(_))));
        assert_eq!(engine.value(), before);
    }

    #[test]
    fn test_reset() {
        let mut engine = AtrEngine::new(3).unwrap();
        engine.step(&candle(0, 10.0, 11.0, 9.0, 10.0)).unwrap();
        engine.reset();
        assert_eq!(engine.value(), None);
        // After reset the next candle is treated as the first again
        let out = engine.step_full(&candle(1, 20.0, 21.0, 20.0, 20.5)).unwrap();
        assert_eq!(out.true_range, 1.0);
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(AtrEngine::new(0).is_err());
    }
}
