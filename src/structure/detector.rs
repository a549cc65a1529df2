// =============================================================================
// Local market structure — break of structure, liquidity sweep, swing type
// =============================================================================
//
// Works on a trailing window (default 20 bars). The last bar is compared with
// the extremes of every earlier bar in the window:
//
//   BOS:   close above the prior max high (bullish) or below the prior min
//          low (bearish).
//   SWEEP: wick beyond a prior extreme that closes back at or inside it.
//          An upside sweep is a bearish trap, a downside sweep a bullish one.
//
// Swing type only looks at the bar immediately before the last one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

pub const DEFAULT_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StructureType {
    Bos,
    Sweep,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StructureDirection {
    Bullish,
    Bearish,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwingType {
    #[serde(rename = "HH")]
    HigherHigh,
    #[serde(rename = "HL")]
    HigherLow,
    #[serde(rename = "LH")]
    LowerHigh,
    #[serde(rename = "LL")]
    LowerLow,
    #[default]
    #[serde(rename = "NONE")]
    None,
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bos => write!(f, "BOS"),
            Self::Sweep => write!(f, "SWEEP"),
            Self::None => write!(f, "NONE"),
        }
    }
}

impl fmt::Display for StructureDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Bearish => write!(f, "BEARISH"),
            Self::None => write!(f, "NONE"),
        }
    }
}

impl fmt::Display for SwingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HigherHigh => write!(f, "HH"),
            Self::HigherLow => write!(f, "HL"),
            Self::LowerHigh => write!(f, "LH"),
            Self::LowerLow => write!(f, "LL"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Structure read of the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StructureVerdict {
    pub kind: StructureType,
    pub direction: StructureDirection,
    pub swing: SwingType,
    pub bos: bool,
    pub sweep: bool,
    /// Max high of the window before the last bar.
    pub prior_high: Option<f64>,
    /// Min low of the window before the last bar.
    pub prior_low: Option<f64>,
}

/// Classify the structure of the last bar of `candles` against the preceding
/// `window - 1` bars. Fewer than `window` candles (or `window < 2`) yields the
/// default verdict, as does a window holding a non-finite high, low or close.
pub fn detect_structure(candles: &[Candle], window: usize) -> StructureVerdict {
    if window < 2 || candles.len() < window {
        return StructureVerdict::default();
    }

    let recent = &candles[candles.len() - window..];
    if !recent
        .iter()
        .all(|c| c.high.is_finite() && c.low.is_finite() && c.close.is_finite())
    {
        return StructureVerdict::default();
    }
    let (prior, last) = recent.split_at(window - 1);
    let last = &last[0];

    let prior_high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let prior_low = prior.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);

    let bos_up = last.close > prior_high;
    let bos_down = last.close < prior_low;
    let sweep_high = last.high > prior_high && last.close <= prior_high;
    let sweep_low = last.low < prior_low && last.close >= prior_low;

    let (kind, direction) = if bos_up {
        (StructureType::Bos, StructureDirection::Bullish)
    } else if bos_down {
        (StructureType::Bos, StructureDirection::Bearish)
    } else if sweep_high {
        (StructureType::Sweep, StructureDirection::Bearish)
    } else if sweep_low {
        (StructureType::Sweep, StructureDirection::Bullish)
    } else {
        (StructureType::None, StructureDirection::None)
    };

    StructureVerdict {
        kind,
        direction,
        swing: classify_swing(&prior[prior.len() - 1], last),
        bos: bos_up || bos_down,
        sweep: sweep_high || sweep_low,
        prior_high: Some(prior_high),
        prior_low: Some(prior_low),
    }
}

/// Swing type of `cur` relative to the bar right before it.
pub fn classify_swing(prev: &Candle, cur: &Candle) -> SwingType {
    let (h, l, ph, pl) = (cur.high, cur.low, prev.high, prev.low);
    if h > ph && l > pl {
        SwingType::HigherHigh
    } else if h < ph && l < pl {
        SwingType::LowerLow
    } else if h > ph && l <= pl {
        SwingType::HigherLow
    } else if h <= ph && l < pl {
        SwingType::LowerHigh
    } else {
        SwingType::None
    }
}
