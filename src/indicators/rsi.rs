// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1: Compute price changes (deltas) from consecutive closes.
// Step 2: Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3: Apply Wilder's smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4: RS  = avg_gain / max(avg_loss, EPSILON)
//          RSI = 100 - 100 / (1 + RS)
//
// Thresholds:  RSI >= 70 => OVERBOUGHT,  RSI <= 30 => OVERSOLD.
// =============================================================================

/// Default look-back.
pub const DEFAULT_PERIOD: usize = 14;

/// Floor for the average loss so an all-gain window yields RSI just below 100.
const LOSS_EPSILON: f64 = 1e-5;

/// Compute the RSI series, index-aligned with `closes`.
///
/// The first defined value sits at index `period` (the first `period` deltas
/// seed the averages). When `period == 0` or there are fewer than
/// `period + 1` closes every entry is `None`.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    match rsi_from_averages(avg_gain, avg_loss) {
        Some(rsi) => out[period] = Some(rsi),
        None => return out,
    }

    // deltas[i - 1] is the change into close i.
    for i in (period + 1)..closes.len() {
        let delta = deltas[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => out[i] = Some(rsi),
            None => break,
        }
    }

    out
}

/// Most recent RSI value with a human-readable label.
pub fn current_rsi(closes: &[f64], period: usize) -> Option<(f64, &'static str)> {
    let value = super::ema::last_defined(&calculate_rsi(closes, period))?;

    let label = if value >= 70.0 {
        "OVERBOUGHT"
    } else if value <= 30.0 {
        "OVERSOLD"
    } else {
        "NEUTRAL"
    };

    Some((value, label))
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// The loss is floored at `LOSS_EPSILON`, so a series with no movement
/// reads 0.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rs = avg_gain / avg_loss.max(LOSS_EPSILON);
    let rsi = 100.0 - 100.0 / (1.0 + rs);

    if rsi.is_finite() {
        Some(rsi.clamp(0.0, 100.0))
    } else {
        None
    }
}
