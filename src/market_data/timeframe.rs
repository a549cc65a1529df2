// =============================================================================
// Timeframe — the fixed set of candle resolutions the store maintains
// =============================================================================
//
// The base resolution (1m) is ingested directly; every coarser timeframe is
// built from a fixed number of consecutive base candles.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
}

impl Timeframe {
    /// Resolution that is ingested directly and aggregated upward.
    pub const BASE: Timeframe = Timeframe::M1;

    /// All timeframes, finest first.
    pub const ALL: [Timeframe; 5] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
        }
    }

    /// Number of base candles that make up one candle of this timeframe.
    pub fn base_multiple(self) -> usize {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
        }
    }

    pub fn minutes(self) -> u64 {
        self.base_multiple() as u64
    }

    pub fn is_base(self) -> bool {
        self == Self::BASE
    }

    /// Coarser timeframes derived from the base resolution.
    pub fn derived() -> impl Iterator<Item = Timeframe> {
        Self::ALL.into_iter().filter(|tf| !tf.is_base())
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" => Ok(Self::H1),
            other => anyhow::bail!("unsupported timeframe '{other}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_agree() {
        for tf in Timeframe::ALL {
            let parsed: Timeframe = tf.as_str().parse().unwrap();
            assert_eq!(parsed, tf);
            assert_eq!(tf.to_string(), tf.as_str());
        }
    }

    #[test]
    fn unknown_timeframe_is_rejected() {
        assert!("4h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn derived_excludes_base() {
        let derived: Vec<Timeframe> = Timeframe::derived().collect();
        assert_eq!(derived.len(), 4);
        assert!(!derived.contains(&Timeframe::M1));
        assert_eq!(Timeframe::H1.base_multiple(), 60);
    }

    #[test]
    fn serde_uses_interval_string() {
        assert_eq!(serde_json::to_string(&Timeframe::M15).unwrap(), "\"15m\"");
    }
}
