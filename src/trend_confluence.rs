// =============================================================================
// Multi-timeframe trend confluence and macro projection
// =============================================================================
//
// Each timeframe with enough history votes with its EMA(20)/EMA(50) stack:
//
//   BULLISH vote  = close > EMA20 > EMA50
//   BEARISH vote  = close < EMA20 < EMA50
//
// Three agreeing votes out of the four confluence timeframes decide the trend.
// The macro read uses the highest timeframe with enough history and projects
// a target price plus a rough duration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::atr::current_atr;
use crate::indicators::ema::{calculate_ema, last_defined};
use crate::market_data::{Candle, SeriesByTimeframe, Timeframe};
use crate::types::Trend;

/// Timeframes that take part in the confluence vote.
pub const CONFLUENCE_TIMEFRAMES: [Timeframe; 4] =
    [Timeframe::M1, Timeframe::M5, Timeframe::M15, Timeframe::H1];

/// Minimum candles a timeframe needs before it may vote.
pub const MIN_SAMPLES: usize = 50;

/// Agreeing votes required for a non-neutral verdict.
pub const MIN_VOTES: usize = 3;

const TARGET_LOOKBACK: usize = 20;
const ATR_PROJECTION: f64 = 3.0;
const MIN_DURATION_HOURS: f64 = 1.0;
const MAX_DURATION_HOURS: f64 = 8.0;

/// Higher-timeframe trend read with a projected target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroProjection {
    pub trend: Trend,
    pub target: f64,
    pub duration: String,
    /// Timeframe the projection was computed on; `None` without enough data.
    pub timeframe: Option<Timeframe>,
}

/// EMA(20)/EMA(50) stack vote for one series.
pub fn ema_stack_vote(candles: &[Candle]) -> Trend {
    if candles.len() < MIN_SAMPLES {
        return Trend::Neutral;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let (Some(e20), Some(e50)) = (
        last_defined(&calculate_ema(&closes, 20)),
        last_defined(&calculate_ema(&closes, 50)),
    ) else {
        return Trend::Neutral;
    };
    let current = closes[closes.len() - 1];

    if current > e20 && e20 > e50 {
        Trend::Bullish
    } else if current < e20 && e20 < e50 {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

/// Overall trend across `CONFLUENCE_TIMEFRAMES`.
pub fn analyze_trend_confluence(series: &SeriesByTimeframe) -> Trend {
    let mut bullish = 0usize;
    let mut bearish = 0usize;

    for tf in CONFLUENCE_TIMEFRAMES {
        let candles = series.get(&tf).map_or(&[][..], Vec::as_slice);
        match ema_stack_vote(candles) {
            Trend::Bullish => bullish += 1,
            Trend::Bearish => bearish += 1,
            Trend::Neutral => {}
        }
    }

    let verdict = if bullish >= MIN_VOTES {
        Trend::Bullish
    } else if bearish >= MIN_VOTES {
        Trend::Bearish
    } else {
        Trend::Neutral
    };
    debug!(bullish, bearish, %verdict, "trend confluence");
    verdict
}

/// Macro trend, target and duration from the highest timeframe holding at
/// least `MIN_SAMPLES` candles.
///
/// Target: the 20-bar extreme in the trend direction when it still lies at
/// least one ATR beyond price, else price +/- 3 ATR. Duration: bars needed at
/// the average close-to-close pace, converted to hours and clamped to 1..=8.
pub fn analyze_macro_structure(series: &SeriesByTimeframe) -> MacroProjection {
    let Some((tf, candles)) = Timeframe::ALL
        .into_iter()
        .rev()
        .find_map(|tf| {
            series
                .get(&tf)
                .filter(|c| c.len() >= MIN_SAMPLES)
                .map(|c| (tf, c.as_slice()))
        })
    else {
        return MacroProjection {
            trend: Trend::Neutral,
            target: current_price(series).unwrap_or(0.0),
            duration: "unknown".to_string(),
            timeframe: None,
        };
    };

    let price = candles[candles.len() - 1].close;
    let trend = ema_stack_vote(candles);
    let atr = current_atr(candles).unwrap_or(0.0);
    let recent = &candles[candles.len().saturating_sub(TARGET_LOOKBACK)..];

    let target = match trend {
        Trend::Bullish => {
            let recent_high = recent.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
            if recent_high > price && recent_high - price >= atr {
                recent_high
            } else {
                price + ATR_PROJECTION * atr
            }
        }
        Trend::Bearish => {
            let recent_low = recent.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
            if recent_low < price && price - recent_low >= atr {
                recent_low
            } else {
                price - ATR_PROJECTION * atr
            }
        }
        Trend::Neutral => price,
    };

    let hours = estimate_hours(candles, (target - price).abs(), tf);
    let projection = MacroProjection {
        trend,
        target,
        duration: format!("~{}-{}h", hours, hours + 2),
        timeframe: Some(tf),
    };
    debug!(
        timeframe = %tf,
        trend = %projection.trend,
        target = projection.target,
        duration = %projection.duration,
        "macro structure"
    );
    projection
}

fn estimate_hours(candles: &[Candle], distance: f64, tf: Timeframe) -> u32 {
    let moves: Vec<f64> = candles
        .windows(2)
        .map(|w| (w[1].close - w[0].close).abs())
        .collect();
    let avg_move = if moves.is_empty() {
        0.0
    } else {
        moves.iter().sum::<f64>() / moves.len() as f64
    };

    let hours = if distance <= 0.0 {
        MIN_DURATION_HOURS
    } else if avg_move <= 0.0 {
        MAX_DURATION_HOURS
    } else {
        let bars = (distance / avg_move).ceil();
        (bars * tf.minutes() as f64 / 60.0).ceil()
    };
    hours.clamp(MIN_DURATION_HOURS, MAX_DURATION_HOURS) as u32
}

fn current_price(series: &SeriesByTimeframe) -> Option<f64> {
    series
        .values()
        .find_map(|candles| candles.last())
        .map(|c| c.close)
}
