use std::fmt;

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

const PHASE_WINDOW: usize = 20;
const EXPANSION_RATIO: f64 = 1.2;
/// Close range below this percentage of the low counts as compression.
const COMPRESSION_RANGE_PCT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketPhase {
    Expansion,
    Compression,
    #[default]
    None,
}

impl MarketPhase {
    /// Label used in outbound decisions. `None` is reported as UNCLEAR.
    pub fn label(self) -> &'static str {
        match self {
            Self::Expansion => "EXPANSION",
            Self::Compression => "COMPRESSION",
            Self::None => "UNCLEAR",
        }
    }
}

impl fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify the last `PHASE_WINDOW` bars.
///
/// EXPANSION when the latest absolute close-to-close move exceeds 1.2x the
/// move 10 steps earlier; otherwise COMPRESSION when the close range is under
/// 0.1% of the lowest close.
pub fn detect_market_phase(candles: &[Candle]) -> MarketPhase {
    if candles.len() < PHASE_WINDOW {
        return MarketPhase::None;
    }

    let closes: Vec<f64> = candles[candles.len() - PHASE_WINDOW..]
        .iter()
        .map(|c| c.close)
        .collect();
    let moves: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]).abs()).collect();

    let last = moves[moves.len() - 1];
    let earlier = moves[moves.len() - 10];
    if last > earlier * EXPANSION_RATIO {
        return MarketPhase::Expansion;
    }

    let high = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = closes.iter().copied().fold(f64::INFINITY, f64::min);
    if low > 0.0 && (high - low) / low * 100.0 < COMPRESSION_RANGE_PCT {
        return MarketPhase::Compression;
    }

    MarketPhase::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64, c, c, c, c, 1.0))
            .collect()
    }

    #[test]
    fn flat_series_is_compression() {
        assert_eq!(detect_market_phase(&bars(&[100.0; 25])), MarketPhase::Compression);
    }

    #[test]
    fn jump_on_last_bar_is_expansion() {
        let mut closes: Vec<f64> = (0..19).map(|i| 100.0 + i as f64 * 0.1).collect();
        closes.push(closes[18] + 2.0);
        assert_eq!(detect_market_phase(&bars(&closes)), MarketPhase::Expansion);
    }

    #[test]
    fn steady_trend_is_unclear() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.5).collect();
        let phase = detect_market_phase(&bars(&closes));
        assert_eq!(phase, MarketPhase::None);
        assert_eq!(phase.label(), "UNCLEAR");
    }

    #[test]
    fn short_input_is_unclear() {
        assert_eq!(detect_market_phase(&bars(&[100.0; 5])), MarketPhase::None);
    }
}
