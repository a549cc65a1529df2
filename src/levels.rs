// =============================================================================
// Trade levels — entry / stop / targets handed to the chart and alert layers
// =============================================================================
//
// Risk (1R) is `atr * multiplier`. The stop sits 1R against the direction,
// targets at 1R, 2R and 3R with it. Structure levels (the prior-window
// high/low behind a BOS or sweep) are carried through as plain prices.

use serde::{Deserialize, Serialize};

use crate::structure::{StructureDirection, StructureType, StructureVerdict};
use crate::types::Direction;

pub const DEFAULT_STOP_ATR_MULTIPLIER: f64 = 1.6;

/// Reward multiples of the three take-profit levels.
const TARGET_MULTIPLES: [f64; 3] = [1.0, 2.0, 3.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profits: [f64; 3],
    /// Price distance of 1R.
    pub risk: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bos_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_level: Option<f64>,
}

impl TradeLevels {
    /// Returns `None` when the ATR or entry is not a usable positive number.
    pub fn from_atr(direction: Direction, entry: f64, atr: f64, multiplier: f64) -> Option<Self> {
        if !entry.is_finite() || entry <= 0.0 || !atr.is_finite() || atr <= 0.0 {
            return None;
        }
        let risk = atr * multiplier;
        if !risk.is_finite() || risk <= 0.0 {
            return None;
        }

        let sign = direction.sign();
        let take_profits = TARGET_MULTIPLES.map(|m| entry + sign * risk * m);

        Some(Self {
            direction,
            entry,
            stop_loss: entry - sign * risk,
            take_profits,
            risk,
            bos_level: None,
            sweep_level: None,
        })
    }

    /// Attach the broken or swept level from `verdict`. A bullish break uses
    /// the prior high, a bearish one the prior low. Sweeps use the extreme
    /// that was wicked through, which is the opposite of their direction.
    pub fn with_structure(mut self, verdict: &StructureVerdict) -> Self {
        match (verdict.kind, verdict.direction) {
            (StructureType::Bos, StructureDirection::Bullish) => self.bos_level = verdict.prior_high,
            (StructureType::Bos, StructureDirection::Bearish) => self.bos_level = verdict.prior_low,
            (StructureType::Sweep, StructureDirection::Bearish) => self.sweep_level = verdict.prior_high,
            (StructureType::Sweep, StructureDirection::Bullish) => self.sweep_level = verdict.prior_low,
            _ => {}
        }
        self
    }

    /// Reward-to-risk of the furthest target.
    pub fn max_reward_ratio(&self) -> f64 {
        (self.take_profits[2] - self.entry).abs() / self.risk
    }
}
