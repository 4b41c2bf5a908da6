//! Types for the trail engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::pnl::CapitalModel;

/// Upper bound on `signal_delay_candles`
pub const MAX_SIGNAL_DELAY_CANDLES: usize = 1000;

/// A single OHLCV candle as consumed by the indicator pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Unix seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Reject candles that would corrupt the running indicator state.
    pub fn validate(&self) -> EngineResult<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(EngineError::InvalidInput(format!(
                    "candle at {}: {} is not finite",
                    self.time, name
                )));
            }
        }
        if self.volume < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "candle at {}: negative volume {}",
                self.time, self.volume
            )));
        }
        for (name, value) in &fields[..4] {
            if *value <= 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "candle at {}: {} must be positive, got {}",
                    self.time, name, value
                )));
            }
        }
        if self.high < self.low {
            return Err(EngineError::InvalidInput(format!(
                "candle at {}: high {} below low {}",
                self.time, self.high, self.low
            )));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(EngineError::InvalidInput(format!(
                "candle at {}: open/close outside [{}, {}]",
                self.time, self.low, self.high
            )));
        }
        Ok(())
    }
}

impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Exchange-native candlestick (OHLCV) with decimal prices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    /// Milliseconds
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Milliseconds
    pub close_time: i64,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Indicator output for one candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub trail1: f64,
    pub trail2: f64,
    pub atr: f64,
    pub true_range: f64,
}

/// Rejects crossings made during choppy stretches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityFilter {
    /// Number of recent closes to inspect
    pub lookback: usize,
    /// Maximum average |Δclose|/close over the window (e.g. 0.02 = 2%)
    pub max_average_change: f64,
}

/// Configuration for a backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub symbol: String,
    pub interval: String,
    /// Margin committed to each entry (USDT)
    pub initial_capital: f64,
    /// Leverage applied under `CapitalModel::MarginLeverage` (1-100)
    pub leverage: f64,
    /// ROE % (margin model) or USD max PnL (fixed-notional model) counted as a win
    pub win_threshold: f64,
    /// Trail1 EMA length (default: 30)
    pub ema_length: usize,
    /// ATR length (default: 14)
    pub atr_length: usize,
    /// Trail2 stop distance in ATRs (default: 2.0)
    pub atr_multiplier: f64,
    /// Hint to an animated host to pause when a signal executes
    pub pause_on_signal: bool,
    /// Candles between detection and execution (0 = act on the signal candle)
    pub signal_delay_candles: usize,
    /// Minimum |trail1 - trail2| for a crossing to count
    pub min_crossover_threshold: f64,
    pub capital_model: CapitalModel,
    /// Debounce: minimum seconds between accepted signals
    pub min_signal_interval_secs: Option<i64>,
    pub volatility_filter: Option<VolatilityFilter>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "15m".to_string(),
            initial_capital: 1000.0,
            leverage: 20.0,
            win_threshold: 100.0,
            ema_length: 30,
            atr_length: 14,
            atr_multiplier: 2.0,
            pause_on_signal: false,
            signal_delay_candles: 1,
            min_crossover_threshold: 1e-4,
            capital_model: CapitalModel::MarginLeverage,
            min_signal_interval_secs: None,
            volatility_filter: None,
        }
    }
}

impl BacktestConfig {
    /// Collect every validation failure as a human-readable message.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            errors.push(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            ));
        }
        if !(self.leverage.is_finite() && (1.0..=100.0).contains(&self.leverage)) {
            errors.push(format!(
                "leverage must be within [1, 100], got {}",
                self.leverage
            ));
        }
        if !(self.win_threshold.is_finite() && self.win_threshold > 0.0) {
            errors.push(format!(
                "win_threshold must be positive, got {}",
                self.win_threshold
            ));
        }
        if self.ema_length == 0 {
            errors.push("ema_length must be at least 1".to_string());
        }
        if self.atr_length == 0 {
            errors.push("atr_length must be at least 1".to_string());
        }
        if !(self.atr_multiplier.is_finite() && self.atr_multiplier > 0.0) {
            errors.push(format!(
                "atr_multiplier must be positive, got {}",
                self.atr_multiplier
            ));
        }
        if self.signal_delay_candles > MAX_SIGNAL_DELAY_CANDLES {
            errors.push(format!(
                "signal_delay_candles must be at most {}, got {}",
                MAX_SIGNAL_DELAY_CANDLES, self.signal_delay_candles
            ));
        }
        if !(self.min_crossover_threshold.is_finite() && self.min_crossover_threshold >= 0.0) {
            errors.push(format!(
                "min_crossover_threshold must be non-negative, got {}",
                self.min_crossover_threshold
            ));
        }
        if let Some(secs) = self.min_signal_interval_secs {
            if secs <= 0 {
                errors.push(format!(
                    "min_signal_interval_secs must be positive, got {}",
                    secs
                ));
            }
        }
        if let Some(filter) = &self.volatility_filter {
            if filter.lookback == 0 {
                errors.push("volatility_filter.lookback must be at least 1".to_string());
            }
            if !(filter.max_average_change.is_finite() && filter.max_average_change > 0.0) {
                errors.push(format!(
                    "volatility_filter.max_average_change must be positive, got {}",
                    filter.max_average_change
                ));
            }
        }

        errors
    }

    pub fn validate(&self) -> EngineResult<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Configuration(errors))
        }
    }
}

/// A point on the realized PnL curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: i64,
    pub equity: f64,
}
