//! Normalization boundary between exchange klines and the indicator pipeline
//!
//! A single malformed candle permanently skews the EMA / ATR / trail state, so
//! anything that fails conversion or validation is dropped here, together with
//! candles whose time does not strictly increase.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::{Candle, Kline};

/// Candles that survived normalization
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    pub candles: Vec<Candle>,
    pub dropped: usize,
}

impl TryFrom<&Kline> for Candle {
    type Error = EngineError;

    fn try_from(kline: &Kline) -> EngineResult<Self> {
        let candle = Candle {
            time: kline.open_time.div_euclid(1000),
            open: to_f64(kline.open, "open", kline.open_time)?,
            high: to_f64(kline.high, "high", kline.open_time)?,
            low: to_f64(kline.low, "low", kline.open_time)?,
            close: to_f64(kline.close, "close", kline.open_time)?,
            volume: to_f64(kline.volume, "volume", kline.open_time)?,
        };
        candle.validate()?;
        Ok(candle)
    }
}

fn to_f64(value: Decimal, field: &str, open_time: i64) -> EngineResult<f64> {
    value.to_f64().ok_or_else(|| {
        EngineError::InvalidInput(format!(
            "kline at {}: {} {} not representable as f64",
            open_time, field, value
        ))
    })
}

/// Convert exchange klines, dropping malformed or out-of-order ones.
pub fn normalize_klines(klines: &[Kline]) -> Normalized {
    let mut dropped = 0;
    let candles: Vec<Candle> = klines
        .iter()
        .filter_map(|kline| match Candle::try_from(kline) {
            Ok(candle) => Some(candle),
            Err(e) => {
                debug!(error = %e, "Dropping kline");
                dropped += 1;
                None
            }
        })
        .collect();

    let mut normalized = sanitize_candles(candles);
    normalized.dropped += dropped;
    if normalized.dropped > 0 {
        warn!(
            kept = normalized.candles.len(),
            dropped = normalized.dropped,
            "Dropped malformed klines"
        );
    }
    normalized
}

/// Keep only valid candles with strictly increasing time.
pub fn sanitize_candles(candles: Vec<Candle>) -> Normalized {
    let total = candles.len();
    let mut kept: Vec<Candle> = Vec::with_capacity(total);

    for candle in candles {
        if let Err(e) = candle.validate() {
            debug!(error = %e, "Dropping candle");
            continue;
        }
        if let Some(last) = kept.last() {
            if candle.time <= last.time {
                debug!(time = candle.time, last = last.time, "Dropping out-of-order candle");
                continue;
            }
        }
        kept.push(candle);
    }

    Normalized {
        dropped: total - kept.len(),
        candles: kept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn kline(open_time: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline {
            open_time,
            open,
            high,
            low,
            close,
            volume: dec!(12.5),
            close_time: open_time + 59_999,
        }
    }

    #[test]
    fn test_kline_conversion() {
        let k = kline(1_700_000_040_000, dec!(100.5), dec!(101.25), dec!(99.75), dec!(100));
        let candle = Candle::try_from(&k).unwrap();
        assert_eq!(candle.time, 1_700_000_040);
        assert_eq!(candle.open, 100.5);
        assert_eq!(candle.high, 101.25);
        assert_eq!(candle.low, 99.75);
        assert_eq!(candle.close, 100.0);
        assert_eq!(candle.volume, 12.5);
    }

    #[test]
    fn test_inverted_kline_rejected() {
        let k = kline(0, dec!(100), dec!(99), dec!(101), dec!(100));
        assert!(matches!(
            Candle::try_from(&k),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_normalize_drops_bad_and_duplicate_klines() {
        let klines = vec![
            kline(0, dec!(100), dec!(101), dec!(99), dec!(100)),
            kline(60_000, dec!(100), dec!(102), dec!(99), dec!(101)),
            // duplicate timestamp
            kline(60_000, dec!(101), dec!(102), dec!(100), dec!(101)),
            // close above high
            kline(120_000, dec!(101), dec!(102), dec!(100), dec!(103)),
            // out of order
            kline(30_000, dec!(100), dec!(101), dec!(99), dec!(100)),
            kline(180_000, dec!(101), dec!(104), dec!(100), dec!(103)),
        ];
        let normalized = normalize_klines(&klines);
        assert_eq!(normalized.dropped, 3);
        let times: Vec<i64> = normalized.candles.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![0, 60, 180]);
    }

    #[test]
    fn test_sanitize_candles() {
        let candles = vec![
            Candle::new(0, 10.0, 11.0, 9.0, 10.0, 1.0),
            Candle::new(60, 10.0, 11.0, 9.0, f64::INFINITY, 1.0),
            Candle::new(120, 10.0, 11.0, 9.0, 10.5, 1.0),
        ];
        let normalized = sanitize_candles(candles);
        assert_eq!(normalized.candles.len(), 2);
        assert_eq!(normalized.dropped, 1);
    }
}
