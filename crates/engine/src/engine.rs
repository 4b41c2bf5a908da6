//! Bar-by-bar replay driver and batch backtest engine

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entry::Entry;
use crate::error::{EngineError, EngineResult};
use crate::signals::{DetectorConfig, Signal, SignalDetector};
use crate::statistics::{equity_curve, BacktestStatistics};
use crate::trail::TrailIndicator;
use crate::types::*;

/// Everything one candle produced
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStep {
    pub index: usize,
    pub point: IndicatorPoint,
    /// Signal that became ready (and executed) on this candle
    pub signal: Option<Signal>,
    /// Entry closed on this candle
    pub closed: Option<Entry>,
    /// Id of the entry opened on this candle
    pub opened: Option<u64>,
    /// Set when `pause_on_signal` is on and a signal executed
    pub paused: bool,
}

/// Result of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub config: BacktestConfig,
    pub start_time: i64,
    pub end_time: i64,
    pub total_candles: usize,
    pub points: Vec<IndicatorPoint>,
    pub entries: Vec<Entry>,
    pub statistics: BacktestStatistics,
    pub equity_curve: Vec<EquityPoint>,
}

/// Step-wise pipeline: candles -> trail indicator -> signal detector -> entries.
///
/// Each run owns its own state; build a new `Replay` per symbol/run.
pub struct Replay {
    config: BacktestConfig,
    indicator: TrailIndicator,
    detector: SignalDetector,
    points: Vec<IndicatorPoint>,
    entries: Vec<Entry>,
    active: Option<Entry>,
    last_candle: Option<Candle>,
    start_time: Option<i64>,
    next_index: usize,
    next_entry_id: u64,
}

impl Replay {
    pub fn new(config: BacktestConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            indicator: TrailIndicator::from_config(&config)?,
            detector: SignalDetector::new(DetectorConfig::from(&config)),
            config,
            points: Vec::new(),
            entries: Vec::new(),
            active: None,
            last_candle: None,
            start_time: None,
            next_index: 0,
            next_entry_id: 1,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Currently open entry, if any.
    pub fn active(&self) -> Option<&Entry> {
        self.active.as_ref()
    }

    /// Closed entries so far, in order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn points(&self) -> &[IndicatorPoint] {
        &self.points
    }

    pub fn pending_signals(&self) -> impl Iterator<Item = &Signal> {
        self.detector.pending()
    }

    /// Statistics over the entries closed so far.
    pub fn statistics(&self) -> BacktestStatistics {
        BacktestStatistics::from_entries(&self.entries)
    }

    pub fn step(&mut self, candle: &Candle) -> EngineResult<ReplayStep> {
        if let Some(last) = &self.last_candle {
            if candle.time <= last.time {
                return Err(EngineError::InvalidInput(format!(
                    "candle time {} is not after previous {}",
                    candle.time, last.time
                )));
            }
        }

        let index = self.next_index;
        let point = self.indicator.step(candle)?;
        let signal = self.detector.observe(
            point.trail1,
            point.trail2,
            candle.time,
            index,
            Some(candle),
        );

        let mut closed = None;
        let mut opened = None;

        if let Some(signal) = &signal {
            if let Some(mut entry) = self.active.take() {
                entry.close(candle, index, self.config.win_threshold)?;
                debug!(
                    id = entry.id,
                    direction = %entry.direction,
                    exit = candle.close,
                    pnl = entry.pnl,
                    roe = entry.roe,
                    "Closed entry on signal"
                );
                closed = Some(entry.clone());
                self.entries.push(entry);
            }

            let mut entry = Entry::new(self.next_entry_id, signal);
            entry.execute(
                candle,
                index,
                self.config.capital_model,
                self.config.initial_capital,
                self.config.leverage,
            )?;
            debug!(
                id = entry.id,
                direction = %entry.direction,
                price = entry.entry_price,
                size = entry.position_size,
                signal_index = signal.detected_at_index,
                index,
                "Opened entry"
            );
            opened = Some(entry.id);
            self.next_entry_id += 1;
            self.active = Some(entry);
        } else if let Some(entry) = self.active.as_mut() {
            entry.update(candle, index)?;
        }

        self.points.push(point);
        self.last_candle = Some(*candle);
        self.start_time.get_or_insert(candle.time);
        self.next_index += 1;

        Ok(ReplayStep {
            index,
            point,
            paused: self.config.pause_on_signal && signal.is_some(),
            signal,
            closed,
            opened,
        })
    }

    /// Force-close any open entry on the last candle and build the report.
    pub fn finish(mut self) -> EngineResult<BacktestReport> {
        if let (Some(mut entry), Some(last)) = (self.active.take(), self.last_candle) {
            entry.close(&last, self.next_index - 1, self.config.win_threshold)?;
            debug!(
                id = entry.id,
                exit = last.close,
                pnl = entry.pnl,
                "Closed entry at end of data"
            );
            self.entries.push(entry);
        }

        let statistics = BacktestStatistics::from_entries(&self.entries);
        let equity_curve = equity_curve(self.config.initial_capital, &self.entries);

        Ok(BacktestReport {
            start_time: self.start_time.unwrap_or(0),
            end_time: self.last_candle.map(|c| c.time).unwrap_or(0),
            total_candles: self.next_index,
            points: self.points,
            entries: self.entries,
            statistics,
            equity_curve,
            config: self.config,
        })
    }
}

/// Batch backtesting over a complete candle slice
pub struct BacktestEngine;

impl BacktestEngine {
    /// Run a backtest on the given candles with the specified config
    pub fn run(config: &BacktestConfig, candles: &[Candle]) -> EngineResult<BacktestReport> {
        let mut replay = Replay::new(config.clone())?;

        info!(
            symbol = %config.symbol,
            bars = candles.len(),
            capital = config.initial_capital,
            leverage = config.leverage,
            ema_length = config.ema_length,
            atr_length = config.atr_length,
            delay = config.signal_delay_candles,
            "Starting backtest"
        );

        for candle in candles {
            replay.step(candle)?;
        }
        let report = replay.finish()?;

        info!(
            total_entries = report.statistics.total_entries,
            winning_entries = report.statistics.winning_entries,
            win_rate = report.statistics.win_rate,
            total_pnl = report.statistics.total_pnl,
            "Backtest complete"
        );

        Ok(report)
    }

    /// Indicator points only, no trading.
    pub fn indicators(config: &BacktestConfig, candles: &[Candle]) -> EngineResult<Vec<IndicatorPoint>> {
        config.validate()?;
        TrailIndicator::from_config(config)?.compute(candles)
    }
}
