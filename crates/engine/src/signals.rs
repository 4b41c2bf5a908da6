//! Trail1 / Trail2 cross-over detection
//!
//! A crossing is accepted only if it clears the magnitude guard and the
//! optional debounce and volatility filters. Accepted signals wait in a queue
//! until `signal_delay_candles` more candles have been observed, then come
//! back from `observe` as "ready" with their execution index filled in.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{BacktestConfig, Candle, Direction, VolatilityFilter};

/// A detected cross-over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: u64,
    pub direction: Direction,
    pub detected_at_time: i64,
    pub detected_at_index: usize,
    pub trail1_value: f64,
    pub trail2_value: f64,
    pub execution_delay_candles: usize,
    /// Set once the signal is handed out as ready
    pub execution_index: Option<usize>,
}

impl Signal {
    pub fn is_ready_at(&self, candle_index: usize) -> bool {
        candle_index >= self
            .detected_at_index
            .saturating_add(self.execution_delay_candles)
    }
}

/// Detector knobs, usually taken from a `BacktestConfig`
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub signal_delay_candles: usize,
    pub min_crossover_threshold: f64,
    pub min_signal_interval_secs: Option<i64>,
    pub volatility_filter: Option<VolatilityFilter>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            signal_delay_candles: 1,
            min_crossover_threshold: 1e-4,
            min_signal_interval_secs: None,
            volatility_filter: None,
        }
    }
}

impl From<&BacktestConfig> for DetectorConfig {
    fn from(config: &BacktestConfig) -> Self {
        Self {
            signal_delay_candles: config.signal_delay_candles,
            min_crossover_threshold: config.min_crossover_threshold,
            min_signal_interval_secs: config.min_signal_interval_secs,
            volatility_filter: config.volatility_filter,
        }
    }
}

pub struct SignalDetector {
    config: DetectorConfig,
    previous: Option<(f64, f64)>,
    queue: VecDeque<Signal>,
    recent_closes: VecDeque<f64>,
    last_signal_time: Option<i64>,
    next_id: u64,
}

impl SignalDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            previous: None,
            queue: VecDeque::new(),
            recent_closes: VecDeque::new(),
            last_signal_time: None,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Feed one candle's trail values; returns a signal once it is ready to execute.
    pub fn observe(
        &mut self,
        trail1: f64,
        trail2: f64,
        time: i64,
        candle_index: usize,
        candle: Option<&Candle>,
    ) -> Option<Signal> {
        if let Some(candle) = candle {
            self.record_close(candle.close);
        }

        let crossing = self
            .previous
            .and_then(|(prev1, prev2)| crossing(prev1, prev2, trail1, trail2));
        self.previous = Some((trail1, trail2));

        if let Some(direction) = crossing {
            if self.accept(direction, trail1, trail2, time) {
                let signal = Signal {
                    id: self.next_id,
                    direction,
                    detected_at_time: time,
                    detected_at_index: candle_index,
                    trail1_value: trail1,
                    trail2_value: trail2,
                    execution_delay_candles: self.config.signal_delay_candles,
                    execution_index: None,
                };
                debug!(
                    id = signal.id,
                    direction = %direction,
                    index = candle_index,
                    trail1,
                    trail2,
                    "Signal detected"
                );
                self.next_id += 1;
                self.last_signal_time = Some(time);
                self.queue.push_back(signal);
            }
        }

        self.pop_ready(candle_index)
    }

    /// Signals accepted but still waiting out their execution delay.
    pub fn pending(&self) -> impl Iterator<Item = &Signal> {
        self.queue.iter()
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.queue.clear();
        self.recent_closes.clear();
        self.last_signal_time = None;
        self.next_id = 1;
    }

    fn accept(&self, direction: Direction, trail1: f64, trail2: f64, time: i64) -> bool {
        if (trail1 - trail2).abs() < self.config.min_crossover_threshold {
            debug!(direction = %direction, time, "Crossing below magnitude guard");
            return false;
        }

        if let (Some(min_interval), Some(last)) =
            (self.config.min_signal_interval_secs, self.last_signal_time)
        {
            if time - last < min_interval {
                debug!(direction = %direction, time, last, "Crossing debounced");
                return false;
            }
        }

        if let Some(filter) = &self.config.volatility_filter {
            if let Some(avg_change) = self.average_relative_change() {
                if avg_change > filter.max_average_change {
                    debug!(direction = %direction, time, avg_change, "Crossing rejected as noise");
                    return false;
                }
            }
        }

        true
    }

    fn record_close(&mut self, close: f64) {
        let Some(filter) = &self.config.volatility_filter else {
            return;
        };
        self.recent_closes.push_back(close);
        // `lookback` changes need one extra close
        while self.recent_closes.len() > filter.lookback + 1 {
            self.recent_closes.pop_front();
        }
    }

    fn average_relative_change(&self) -> Option<f64> {
        if self.recent_closes.len() < 2 {
            return None;
        }
        // Pairs without a positive finite base have no relative change
        let (sum, count) = self
            .recent_closes
            .iter()
            .zip(self.recent_closes.iter().skip(1))
            .filter(|(prev, curr)| prev.is_finite() && **prev > 0.0 && curr.is_finite())
            .fold((0.0, 0usize), |(sum, count), (prev, curr)| {
                (sum + ((curr - prev) / prev).abs(), count + 1)
            });
        (count > 0).then(|| sum / count as f64)
    }

    fn pop_ready(&mut self, candle_index: usize) -> Option<Signal> {
        if !self.queue.front()?.is_ready_at(candle_index) {
            return None;
        }
        let mut signal = self.queue.pop_front()?;
        signal.execution_index = Some(candle_index);
        Some(signal)
    }
}

fn crossing(prev1: f64, prev2: f64, trail1: f64, trail2: f64) -> Option<Direction> {
    if prev1 <= prev2 && trail1 > trail2 {
        Some(Direction::Long)
    } else if prev1 >= prev2 && trail1 < trail2 {
        Some(Direction::Short)
    } else {
        None
    }
}
