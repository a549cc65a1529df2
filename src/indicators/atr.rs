// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is then the smoothed average of TR using Wilder's method:
//   ATR_period = SMA of the first `period` TR values
//   ATR_t      = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Default period: 14
// =============================================================================

use crate::market_data::Candle;

pub const DEFAULT_PERIOD: usize = 14;

/// Latest ATR must be at least this multiple of the ATR 5 readings earlier.
pub const EXPANSION_THRESHOLD: f64 = 1.15;

/// Compute the ATR series, index-aligned with `candles`.
///
/// The first defined value sits at index `period` (TR needs a previous close,
/// so `period` TR values exist from index `period` onward). Fewer than
/// `period + 1` candles or `period == 0` yields an all-`None` series. A bar
/// with a non-finite high, low or previous close stops the series.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    // tr[i - 1] is the true range of bar i.
    let tr: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            if ![cur.high, cur.low, prev.close].iter().all(|v| v.is_finite()) {
                return f64::NAN;
            }
            let hl = cur.high - cur.low;
            let hc = (cur.high - prev.close).abs();
            let lc = (cur.low - prev.close).abs();
            hl.max(hc).max(lc)
        })
        .collect();

    let period_f = period as f64;
    let mut atr = tr[..period].iter().sum::<f64>() / period_f;
    if !atr.is_finite() {
        return out;
    }
    out[period] = Some(atr);

    for i in (period + 1)..candles.len() {
        atr = (atr * (period_f - 1.0) + tr[i - 1]) / period_f;
        if !atr.is_finite() {
            break;
        }
        out[i] = Some(atr);
    }

    out
}

/// Most recent ATR value with the default 14-period look-back.
pub fn current_atr(candles: &[Candle]) -> Option<f64> {
    super::ema::last_defined(&calculate_atr(candles, DEFAULT_PERIOD))
}

/// True when the latest defined ATR is at least `threshold` times the 5th most
/// recent defined ATR. A zero reference never counts as expansion.
pub fn is_expanding(atr: &[Option<f64>], threshold: f64) -> bool {
    let values = super::ema::defined(atr);
    if values.len() < 5 {
        return false;
    }
    let current = values[values.len() - 1];
    let prev = values[values.len() - 5];
    prev > 0.0 && current >= prev * threshold
}

/// True when the mean of the last 5 defined ATR readings is below 0.9 times
/// the mean of the 5 readings before them.
pub fn is_compressing(atr: &[Option<f64>]) -> bool {
    let values = super::ema::defined(atr);
    if values.len() < 10 {
        return false;
    }
    let n = values.len();
    let recent = values[n - 5..].iter().sum::<f64>() / 5.0;
    let older = values[n - 10..n - 5].iter().sum::<f64>() / 5.0;
    recent < older * 0.9
}
