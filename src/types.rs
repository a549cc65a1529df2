// =============================================================================
// Shared types used across the confluence engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional verdict shared by the trend resolvers and the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Default for Trend {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Bearish => write!(f, "BEARISH"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Side of an emitted signal. Derived by the caller from recent price delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// `+1.0` for BUY, `-1.0` for SELL. Used to offset price levels.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Coarse risk bucket attached to outbound decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// LOW at 80+, MEDIUM at 60+, HIGH below.
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Self::Low
        } else if score >= 60 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_buckets() {
        assert_eq!(RiskLevel::from_score(95), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0), RiskLevel::High);
    }

    #[test]
    fn trend_serialises_uppercase() {
        let json = serde_json::to_string(&Trend::Bullish).unwrap();
        assert_eq!(json, "\"BULLISH\"");
        let back: Direction = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(back, Direction::Sell);
    }
}
