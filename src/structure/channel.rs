use std::fmt;

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

/// Bars inspected for a channel.
pub const CHANNEL_WINDOW: usize = 20;

/// Higher-high and higher-low counts (or lower/lower) must both exceed this
/// out of `CHANNEL_WINDOW - 1` comparisons.
pub const CHANNEL_MIN_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Ascending,
    Descending,
    #[default]
    None,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "ASCENDING"),
            Self::Descending => write!(f, "DESCENDING"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Count bar-over-bar higher highs/lows and lower highs/lows across the last
/// `CHANNEL_WINDOW` candles.
pub fn detect_channel(candles: &[Candle]) -> Channel {
    if candles.len() < CHANNEL_WINDOW {
        return Channel::None;
    }
    let recent = &candles[candles.len() - CHANNEL_WINDOW..];

    let (mut hh, mut hl, mut lh, mut ll) = (0usize, 0usize, 0usize, 0usize);
    for w in recent.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        if cur.high > prev.high {
            hh += 1;
        }
        if cur.low > prev.low {
            hl += 1;
        }
        if cur.high < prev.high {
            lh += 1;
        }
        if cur.low < prev.low {
            ll += 1;
        }
    }

    if hh > CHANNEL_MIN_COUNT && hl > CHANNEL_MIN_COUNT {
        Channel::Ascending
    } else if lh > CHANNEL_MIN_COUNT && ll > CHANNEL_MIN_COUNT {
        Channel::Descending
    } else {
        Channel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stepped(n: usize, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let mid = 100.0 + step * i as f64;
                Candle::new(i as i64, mid, mid + 1.0, mid - 1.0, mid, 1.0)
            })
            .collect()
    }

    #[test]
    fn rising_bars_form_ascending_channel() {
        assert_eq!(detect_channel(&stepped(30, 0.5)), Channel::Ascending);
    }

    #[test]
    fn falling_bars_form_descending_channel() {
        assert_eq!(detect_channel(&stepped(20, -0.5)), Channel::Descending);
    }

    #[test]
    fn flat_or_short_input_has_no_channel() {
        assert_eq!(detect_channel(&stepped(30, 0.0)), Channel::None);
        assert_eq!(detect_channel(&stepped(19, 0.5)), Channel::None);
    }

    #[test]
    fn exactly_ten_rises_is_not_enough() {
        // 10 rising comparisons followed by 9 flat ones.
        let mut bars = stepped(11, 0.5);
        let last = *bars.last().unwrap();
        bars.extend(std::iter::repeat(last).take(9));
        assert_eq!(bars.len(), 20);
        assert_eq!(detect_channel(&bars), Channel::None);
    }
}
