// =============================================================================
// Price / RSI divergence — two-point comparison
// =============================================================================
//
// Compares the last value of each series against the value `lookback` bars
// back (index `len - lookback`). Not pivot based: a
// single pair of points per series decides the verdict.
//
//   BULLISH: price lower low,  RSI higher low,  RSI < 40
//   BEARISH: price higher high, RSI lower high, RSI > 60
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOOKBACK: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Divergence {
    Bullish,
    Bearish,
    #[default]
    None,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Bearish => write!(f, "BEARISH"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Detect divergence between `prices` and `rsi` (both oldest first).
///
/// The two slices need not share a length; each is indexed from its own end.
/// Returns `None` when `lookback` is zero or either slice is shorter than
/// `lookback`.
pub fn detect_divergence(prices: &[f64], rsi: &[f64], lookback: usize) -> Divergence {
    if lookback == 0 || prices.len() < lookback || rsi.len() < lookback {
        return Divergence::None;
    }

    let last_price = prices[prices.len() - 1];
    let prev_price = prices[prices.len() - lookback];
    let last_rsi = rsi[rsi.len() - 1];
    let prev_rsi = rsi[rsi.len() - lookback];

    if last_price < prev_price && last_rsi > prev_rsi && last_rsi < 40.0 {
        Divergence::Bullish
    } else if last_price > prev_price && last_rsi < prev_rsi && last_rsi > 60.0 {
        Divergence::Bearish
    } else {
        Divergence::None
    }
}
