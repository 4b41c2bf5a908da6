//! PnL / ROE calculation
//!
//! Stateless helpers used by the entry lifecycle. Two capital models are
//! supported and a run uses exactly one of them:
//! - `MarginLeverage`: position size = margin × leverage / entry price,
//!   a trade wins when its final ROE reaches the win threshold (percent).
//! - `FixedNotional`: position size = capital / entry price (no leverage),
//!   a trade wins when its best unrealized PnL reaches the threshold (USD).

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::Direction;

/// How an entry's position size and win/loss outcome are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapitalModel {
    #[default]
    MarginLeverage,
    FixedNotional,
}

/// Margin and coin amount for a freshly executed entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    pub margin: f64,
    pub leverage: f64,
    pub position_size: f64,
}

impl CapitalModel {
    pub fn size(&self, capital: f64, leverage: f64, entry_price: f64) -> EngineResult<Sizing> {
        match self {
            CapitalModel::MarginLeverage => Ok(Sizing {
                margin: capital,
                leverage,
                position_size: position_size(capital, leverage, entry_price)?,
            }),
            CapitalModel::FixedNotional => Ok(Sizing {
                margin: capital,
                leverage: 1.0,
                position_size: position_size(capital, 1.0, entry_price)?,
            }),
        }
    }

    /// Classify a closed trade.
    pub fn is_win(&self, final_roe: f64, max_pnl: f64, threshold: f64) -> bool {
        match self {
            CapitalModel::MarginLeverage => final_roe >= threshold,
            CapitalModel::FixedNotional => max_pnl >= threshold,
        }
    }
}

/// Coin amount for a leveraged position.
pub fn position_size(margin: f64, leverage: f64, entry_price: f64) -> EngineResult<f64> {
    for (name, value) in [
        ("margin", margin),
        ("leverage", leverage),
        ("entry_price", entry_price),
    ] {
        if !(value.is_finite() && value > 0.0) {
            return Err(EngineError::InvalidArgument(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
    }
    Ok(margin * leverage / entry_price)
}

pub fn pnl(direction: Direction, entry_price: f64, current_price: f64, position_size: f64) -> f64 {
    match direction {
        Direction::Long => (current_price - entry_price) * position_size,
        Direction::Short => (entry_price - current_price) * position_size,
    }
}

/// Return on equity, in percent of margin.
pub fn roe(pnl: f64, margin: f64) -> f64 {
    pnl / margin * 100.0
}

/// Running best/worst excursion of a trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    pub max_pnl: f64,
    pub min_pnl: f64,
    pub max_roe: f64,
    pub min_roe: f64,
}

impl Extrema {
    pub fn new(pnl: f64, roe: f64) -> Self {
        Self {
            max_pnl: pnl,
            min_pnl: pnl,
            max_roe: roe,
            min_roe: roe,
        }
    }

    pub fn observe(&mut self, pnl: f64, roe: f64) {
        self.max_pnl = self.max_pnl.max(pnl);
        self.min_pnl = self.min_pnl.min(pnl);
        self.max_roe = self.max_roe.max(roe);
        self.min_roe = self.min_roe.min(roe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        let size = position_size(200.0, 20.0, 100.0).unwrap();
        assert_eq!(size, 40.0);
        let p = pnl(Direction::Long, 100.0, 110.0, size);
        assert_eq!(p, 400.0);
        assert_eq!(roe(p, 200.0), 200.0);
    }

    #[test]
    fn test_position_size_rejects_non_positive() {
        assert!(matches!(
            position_size(0.0, 20.0, 100.0),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(position_size(200.0, -1.0, 100.0).is_err());
        assert!(position_size(200.0, 20.0, 0.0).is_err());
        assert!(position_size(200.0, 20.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_pnl_sign_by_direction() {
        assert!(pnl(Direction::Long, 100.0, 105.0, 1.0) > 0.0);
        assert!(pnl(Direction::Long, 100.0, 95.0, 1.0) < 0.0);
        assert!(pnl(Direction::Short, 100.0, 95.0, 1.0) > 0.0);
        assert!(pnl(Direction::Short, 100.0, 105.0, 1.0) < 0.0);
        assert_eq!(pnl(Direction::Short, 100.0, 100.0, 3.0), 0.0);
    }

    #[test]
    fn test_fixed_notional_ignores_leverage() {
        let sizing = CapitalModel::FixedNotional.size(500.0, 20.0, 50.0).unwrap();
        assert_eq!(sizing.position_size, 10.0);
        assert_eq!(sizing.leverage, 1.0);

        let sizing = CapitalModel::MarginLeverage.size(500.0, 20.0, 50.0).unwrap();
        assert_eq!(sizing.position_size, 200.0);
    }

    #[test]
    fn test_win_rules() {
        assert!(CapitalModel::MarginLeverage.is_win(120.0, 0.0, 100.0));
        assert!(!CapitalModel::MarginLeverage.is_win(99.0, 1e6, 100.0));
        assert!(CapitalModel::FixedNotional.is_win(-5.0, 2.5, 2.0));
        assert!(!CapitalModel::FixedNotional.is_win(500.0, 1.0, 2.0));
    }

    #[test]
    fn test_extrema_tracks_running_bounds() {
        let mut extrema = Extrema::new(0.0, 0.0);
        extrema.observe(5.0, 2.5);
        extrema.observe(-3.0, -1.5);
        extrema.observe(1.0, 0.5);
        assert_eq!(extrema.max_pnl, 5.0);
        assert_eq!(extrema.min_pnl, -3.0);
        assert_eq!(extrema.max_roe, 2.5);
        assert_eq!(extrema.min_roe, -1.5);
    }
}
