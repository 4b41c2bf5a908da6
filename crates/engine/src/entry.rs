//! Per-trade lifecycle: Pending -> Active -> Closed
//!
//! Every transition checks the current status and returns
//! `EngineError::InvalidStateTransition` when called out of order.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::pnl::{self, CapitalModel, Extrema};
use crate::signals::Signal;
use crate::types::{Candle, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Pending,
    Active,
    Closed,
}

/// One simulated leveraged trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: u64,
    pub direction: Direction,
    pub status: EntryStatus,
    pub signal_id: u64,
    pub signal_index: usize,
    pub signal_time: i64,
    pub capital_model: CapitalModel,
    pub margin: f64,
    pub leverage: f64,
    pub position_size: f64,
    pub entry_price: f64,
    pub entry_time: i64,
    pub entry_index: usize,
    pub exit_price: Option<f64>,
    pub exit_time: Option<i64>,
    pub exit_index: Option<usize>,
    /// Running PnL while active, final PnL once closed
    pub pnl: f64,
    pub roe: f64,
    pub max_pnl: f64,
    pub min_pnl: f64,
    pub max_roe: f64,
    pub min_roe: f64,
    pub is_win: Option<bool>,
    pub candles: Vec<Candle>,
    #[serde(skip)]
    last_index: Option<usize>,
}

impl Entry {
    pub fn new(id: u64, signal: &Signal) -> Self {
        Self {
            id,
            direction: signal.direction,
            status: EntryStatus::Pending,
            signal_id: signal.id,
            signal_index: signal.detected_at_index,
            signal_time: signal.detected_at_time,
            capital_model: CapitalModel::default(),
            margin: 0.0,
            leverage: 0.0,
            position_size: 0.0,
            entry_price: 0.0,
            entry_time: 0,
            entry_index: 0,
            exit_price: None,
            exit_time: None,
            exit_index: None,
            pnl: 0.0,
            roe: 0.0,
            max_pnl: 0.0,
            min_pnl: 0.0,
            max_roe: 0.0,
            min_roe: 0.0,
            is_win: None,
            candles: Vec::new(),
            last_index: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EntryStatus::Active
    }

    /// Fill at the execution candle's close.
    pub fn execute(
        &mut self,
        candle: &Candle,
        index: usize,
        model: CapitalModel,
        capital: f64,
        leverage: f64,
    ) -> EngineResult<()> {
        self.expect_status("execute", EntryStatus::Pending)?;

        let sizing = model.size(capital, leverage, candle.close)?;
        self.capital_model = model;
        self.margin = sizing.margin;
        self.leverage = sizing.leverage;
        self.position_size = sizing.position_size;
        self.entry_price = candle.close;
        self.entry_time = candle.time;
        self.entry_index = index;
        self.set_extrema(Extrema::new(0.0, 0.0));
        self.candles.push(*candle);
        self.last_index = Some(index);
        self.status = EntryStatus::Active;
        Ok(())
    }

    /// Fold a candle observed while the trade is open.
    pub fn update(&mut self, candle: &Candle, index: usize) -> EngineResult<()> {
        self.expect_status("update", EntryStatus::Active)?;
        self.observe(candle, index);
        self.pnl = self.pnl_at(candle.close);
        self.roe = pnl::roe(self.pnl, self.margin);
        Ok(())
    }

    /// Exit at the closing candle's close and classify the trade.
    pub fn close(&mut self, candle: &Candle, index: usize, win_threshold: f64) -> EngineResult<()> {
        self.expect_status("close", EntryStatus::Active)?;
        self.observe(candle, index);

        let final_pnl = self.pnl_at(candle.close);
        let final_roe = pnl::roe(final_pnl, self.margin);
        let mut extrema = self.extrema();
        extrema.observe(final_pnl, final_roe);
        self.set_extrema(extrema);

        self.pnl = final_pnl;
        self.roe = final_roe;
        self.exit_price = Some(candle.close);
        self.exit_time = Some(candle.time);
        self.exit_index = Some(index);
        self.is_win = Some(
            self.capital_model
                .is_win(final_roe, self.max_pnl, win_threshold),
        );
        self.status = EntryStatus::Closed;
        Ok(())
    }

    /// Seconds between fill and exit, if closed.
    pub fn duration_secs(&self) -> Option<i64> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }

    pub fn extrema(&self) -> Extrema {
        Extrema {
            max_pnl: self.max_pnl,
            min_pnl: self.min_pnl,
            max_roe: self.max_roe,
            min_roe: self.min_roe,
        }
    }

    fn pnl_at(&self, price: f64) -> f64 {
        pnl::pnl(self.direction, self.entry_price, price, self.position_size)
    }

    // Appends the candle and folds its high/low excursions, once per index.
    fn observe(&mut self, candle: &Candle, index: usize) {
        if self.last_index == Some(index) {
            return;
        }
        self.candles.push(*candle);
        self.last_index = Some(index);

        let mut extrema = self.extrema();
        for price in [candle.high, candle.low] {
            let pnl = self.pnl_at(price);
            extrema.observe(pnl, pnl::roe(pnl, self.margin));
        }
        self.set_extrema(extrema);
    }

    fn set_extrema(&mut self, extrema: Extrema) {
        self.max_pnl = extrema.max_pnl;
        self.min_pnl = extrema.min_pnl;
        self.max_roe = extrema.max_roe;
        self.min_roe = extrema.min_roe;
    }

    fn expect_status(&self, action: &'static str, expected: EntryStatus) -> EngineResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidStateTransition {
                entry_id: self.id,
                action,
                expected,
                actual: self.status,
            })
        }
    }
}
