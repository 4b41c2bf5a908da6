//! Aggregate statistics over closed entries
//!
//! Always recomputed from the full entry list.

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, EntryStatus};
use crate::types::{Direction, EquityPoint};

const PROFIT_FACTOR_CAP: f64 = 999.99;

/// Identifies a single entry in the statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: u64,
    pub direction: Direction,
    pub pnl: f64,
    pub roe: f64,
}

impl From<&Entry> for EntrySummary {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            direction: entry.direction,
            pnl: entry.pnl,
            roe: entry.roe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestStatistics {
    pub total_entries: u32,
    pub long_entries: u32,
    pub short_entries: u32,
    pub winning_entries: u32,
    pub losing_entries: u32,
    /// Percent of closed entries classified as wins
    pub win_rate: f64,
    pub total_pnl: f64,
    pub average_pnl: f64,
    pub best_entry: Option<EntrySummary>,
    pub worst_entry: Option<EntrySummary>,
    pub average_roe: f64,
    /// Highest intra-trade ROE reached by any entry
    pub peak_roe: f64,
    /// Lowest intra-trade ROE reached by any entry
    pub worst_roe: f64,
    pub total_duration_secs: i64,
    pub average_duration_secs: f64,
    /// Gross profit / gross loss, capped
    pub profit_factor: f64,
    /// Largest peak-to-trough fall of cumulative realized PnL
    pub max_drawdown: f64,
}

impl BacktestStatistics {
    pub fn from_entries(entries: &[Entry]) -> Self {
        let closed: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Closed)
            .collect();

        if closed.is_empty() {
            return Self::default();
        }

        let count = closed.len() as f64;
        let total_entries = closed.len() as u32;
        let long_entries = closed
            .iter()
            .filter(|e| e.direction == Direction::Long)
            .count() as u32;
        let winning_entries = closed.iter().filter(|e| e.is_win == Some(true)).count() as u32;

        let total_pnl: f64 = closed.iter().map(|e| e.pnl).sum();
        let total_roe: f64 = closed.iter().map(|e| e.roe).sum();
        let total_duration_secs: i64 = closed.iter().filter_map(|e| e.duration_secs()).sum();

        let best_entry = closed
            .iter()
            .max_by(|a, b| a.pnl.total_cmp(&b.pnl))
            .map(|e| EntrySummary::from(*e));
        let worst_entry = closed
            .iter()
            .min_by(|a, b| a.pnl.total_cmp(&b.pnl))
            .map(|e| EntrySummary::from(*e));

        let peak_roe = closed
            .iter()
            .map(|e| e.max_roe)
            .fold(f64::NEG_INFINITY, f64::max);
        let worst_roe = closed
            .iter()
            .map(|e| e.min_roe)
            .fold(f64::INFINITY, f64::min);

        let gross_profits: f64 = closed.iter().filter(|e| e.pnl > 0.0).map(|e| e.pnl).sum();
        let gross_losses: f64 = closed
            .iter()
            .filter(|e| e.pnl < 0.0)
            .map(|e| e.pnl.abs())
            .sum();
        let profit_factor = if gross_losses > 0.0 {
            (gross_profits / gross_losses).min(PROFIT_FACTOR_CAP)
        } else if gross_profits > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        let mut cumulative = 0.0;
        let mut peak = 0.0_f64;
        let mut max_drawdown = 0.0_f64;
        for entry in &closed {
            cumulative += entry.pnl;
            peak = peak.max(cumulative);
            max_drawdown = max_drawdown.max(peak - cumulative);
        }

        Self {
            total_entries,
            long_entries,
            short_entries: total_entries - long_entries,
            winning_entries,
            losing_entries: total_entries - winning_entries,
            win_rate: winning_entries as f64 / count * 100.0,
            total_pnl,
            average_pnl: total_pnl / count,
            best_entry,
            worst_entry,
            average_roe: total_roe / count,
            peak_roe,
            worst_roe,
            total_duration_secs,
            average_duration_secs: total_duration_secs as f64 / count,
            profit_factor,
            max_drawdown,
        }
    }
}

/// Capital plus cumulative realized PnL, one point per closed entry.
pub fn equity_curve(initial_capital: f64, entries: &[Entry]) -> Vec<EquityPoint> {
    let mut equity = initial_capital;
    entries
        .iter()
        .filter(|e| e.status == EntryStatus::Closed)
        .filter_map(|e| {
            equity += e.pnl;
            e.exit_time.map(|time| EquityPoint { time, equity })
        })
        .collect()
}
