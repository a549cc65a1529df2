// =============================================================================
// Factor gathering — one fixed struct per scoring call
// =============================================================================
//
// Trend and macro are read once per evaluation cycle from the full snapshot
// (`CycleContext`). Every other factor is derived from the base-resolution
// window handed to `ScoringFactors::gather`, so a resampling loop can vary
// that window without recomputing the multi-timeframe reads.

use serde::{Deserialize, Serialize};

use crate::indicators::atr::{self, EXPANSION_THRESHOLD};
use crate::indicators::divergence::{detect_divergence, Divergence, DEFAULT_LOOKBACK};
use crate::indicators::ema::{defined, last_defined};
use crate::indicators::rsi;
use crate::market_data::{Candle, SymbolSnapshot};
use crate::risk_gate::NewsRisk;
use crate::structure::{
    detect_channel, detect_market_phase, detect_structure, detector::DEFAULT_WINDOW, Channel,
    MarketPhase, StructureVerdict,
};
use crate::trend_confluence::{analyze_macro_structure, analyze_trend_confluence, MacroProjection};
use crate::types::Trend;

/// Multi-timeframe reads shared by every iteration of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleContext {
    pub trend: Trend,
    pub macro_projection: MacroProjection,
}

impl CycleContext {
    pub fn from_snapshot(snapshot: &SymbolSnapshot) -> Self {
        Self {
            trend: analyze_trend_confluence(&snapshot.series),
            macro_projection: analyze_macro_structure(&snapshot.series),
        }
    }
}

/// Everything the probability scorer looks at. Absent data shows up as the
/// neutral variant of each field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringFactors {
    pub trend: Trend,
    pub macro_trend: Trend,
    pub structure: StructureVerdict,
    pub volatility_expanding: bool,
    /// Informational only; not scored.
    pub volatility_compressing: bool,
    pub atr: Option<f64>,
    pub divergence: Divergence,
    pub channel: Channel,
    pub phase: MarketPhase,
    pub news: NewsRisk,
}

impl ScoringFactors {
    /// Derive the window-level factors from `base` (oldest first).
    pub fn gather(base: &[Candle], ctx: &CycleContext, news: NewsRisk) -> Self {
        let closes: Vec<f64> = base.iter().map(|c| c.close).collect();

        let atr_series = atr::calculate_atr(base, atr::DEFAULT_PERIOD);
        let rsi_series = defined(&rsi::calculate_rsi(&closes, rsi::DEFAULT_PERIOD));

        Self {
            trend: ctx.trend,
            macro_trend: ctx.macro_projection.trend,
            structure: detect_structure(base, DEFAULT_WINDOW),
            volatility_expanding: atr::is_expanding(&atr_series, EXPANSION_THRESHOLD),
            volatility_compressing: atr::is_compressing(&atr_series),
            atr: last_defined(&atr_series),
            divergence: detect_divergence(&closes, &rsi_series, DEFAULT_LOOKBACK),
            channel: detect_channel(base),
            phase: detect_market_phase(base),
            news,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Timeframe;
    use crate::risk_gate::NewsStatus;
    use crate::structure::SwingType;

    fn flat(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64 * 60_000, 100.0, 100.0, 100.0, 100.0, 1.0))
            .collect()
    }

    #[test]
    fn flat_window_has_no_factors() {
        let snapshot = SymbolSnapshot {
            symbol: "BTCUSDT".into(),
            series: [(Timeframe::M1, flat(200))].into_iter().collect(),
        };
        let ctx = CycleContext::from_snapshot(&snapshot);
        assert_eq!(ctx.trend, Trend::Neutral);

        let f = ScoringFactors::gather(snapshot.base(), &ctx, NewsRisk::safe());
        assert!(!f.structure.bos);
        assert!(!f.structure.sweep);
        assert_eq!(f.structure.swing, SwingType::None);
        assert!(!f.volatility_expanding);
        assert!(!f.volatility_compressing);
        assert_eq!(f.atr, Some(0.0));
        assert_eq!(f.divergence, Divergence::None);
        assert_eq!(f.channel, Channel::None);
        assert_eq!(f.phase, MarketPhase::Compression);
    }

    #[test]
    fn empty_window_is_all_neutral() {
        let ctx = CycleContext::from_snapshot(&SymbolSnapshot::default());
        let news = NewsRisk {
            status: NewsStatus::Risky,
            events: vec!["test".into()],
        };
        let f = ScoringFactors::gather(&[], &ctx, news.clone());
        assert_eq!(f.trend, Trend::Neutral);
        assert_eq!(f.macro_trend, Trend::Neutral);
        assert_eq!(f.atr, None);
        assert_eq!(f.structure, StructureVerdict::default());
        assert_eq!(f.news, news);
    }
}
