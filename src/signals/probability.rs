// =============================================================================
// Probability scorer — rule-weighted confluence score in [0, 100]
// =============================================================================
//
// | Factor               | Default | Condition                               |
// |----------------------|---------|-----------------------------------------|
// | Technical trend      | +30     | trend != NEUTRAL (-10 when NEUTRAL)     |
// | Macro alignment      | +20     | trend == macro trend (macro non-neutral)|
// | Against macro        | -30     | trend opposes a non-neutral macro trend |
// | Break of structure   | +25     | BOS flag                                |
// | Swing type           | +10     | swing != NONE                           |
// | Volatility expansion | +15     | ATR expanding >= 15%                    |
// | RSI divergence       | +15     | divergence != NONE                      |
// | Channel              | +10     | channel != NONE                         |
//
// The news gate runs last: BLOCK forces 0 and is_safe = false, RISKY
// subtracts 25. The result is clamped to [0, 100].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::Divergence;
use crate::risk_gate::NewsStatus;
use crate::structure::{Channel, SwingType};
use crate::trend_confluence::MacroProjection;
use crate::types::Trend;

use super::analysis::ScoringFactors;

pub const DEFAULT_STRATEGY: &str = "Multi-Factor Confluence";
pub const TREND_STRATEGY: &str = "Trend Continuation";
pub const BOS_STRATEGY: &str = "Break of Structure + Liquidity";

/// Factor weights and penalties. Every field can be overridden from the
/// runtime config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_trend")]
    pub trend: i32,
    #[serde(default = "default_neutral_trend_penalty")]
    pub neutral_trend_penalty: i32,
    #[serde(default = "default_macro_alignment")]
    pub macro_alignment: i32,
    #[serde(default = "default_against_macro_penalty")]
    pub against_macro_penalty: i32,
    #[serde(default = "default_break_of_structure")]
    pub break_of_structure: i32,
    #[serde(default = "default_swing")]
    pub swing: i32,
    #[serde(default = "default_volatility_expansion")]
    pub volatility_expansion: i32,
    #[serde(default = "default_divergence")]
    pub divergence: i32,
    #[serde(default = "default_channel")]
    pub channel: i32,
    #[serde(default = "default_risky_news_penalty")]
    pub risky_news_penalty: i32,
}

fn default_trend() -> i32 {
    30
}

fn default_neutral_trend_penalty() -> i32 {
    10
}

fn default_macro_alignment() -> i32 {
    20
}

fn default_against_macro_penalty() -> i32 {
    30
}

fn default_break_of_structure() -> i32 {
    25
}

fn default_swing() -> i32 {
    10
}

fn default_volatility_expansion() -> i32 {
    15
}

fn default_divergence() -> i32 {
    15
}

fn default_channel() -> i32 {
    10
}

fn default_risky_news_penalty() -> i32 {
    25
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            trend: default_trend(),
            neutral_trend_penalty: default_neutral_trend_penalty(),
            macro_alignment: default_macro_alignment(),
            against_macro_penalty: default_against_macro_penalty(),
            break_of_structure: default_break_of_structure(),
            swing: default_swing(),
            volatility_expansion: default_volatility_expansion(),
            divergence: default_divergence(),
            channel: default_channel(),
            risky_news_penalty: default_risky_news_penalty(),
        }
    }
}

/// Output of one scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityResult {
    pub total_score: u8,
    /// Reasons in the order the factors were evaluated.
    pub confluence: Vec<String>,
    pub is_safe: bool,
    pub strategy: String,
    /// Attached by the consensus loop on acceptance only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macro_projection: Option<MacroProjection>,
}

/// Score `factors` under `weights`. Never fails; missing factors add nothing.
pub fn calculate(factors: &ScoringFactors, weights: &ScoringWeights) -> ProbabilityResult {
    let mut score: i32 = 0;
    let mut confluence = Vec::new();
    let mut strategy = DEFAULT_STRATEGY;

    match factors.trend {
        Trend::Bullish | Trend::Bearish => {
            score += weights.trend;
            confluence.push(format!("Multi-timeframe EMA trend ({})", factors.trend));
            strategy = TREND_STRATEGY;
        }
        Trend::Neutral => score -= weights.neutral_trend_penalty,
    }

    if factors.macro_trend != Trend::Neutral {
        if factors.trend == factors.macro_trend {
            score += weights.macro_alignment;
            confluence.push(format!("Aligned with macro trend ({})", factors.macro_trend));
        } else if factors.trend != Trend::Neutral {
            score -= weights.against_macro_penalty;
            confluence.push(format!("Against macro trend ({})", factors.macro_trend));
        }
    }

    if factors.structure.bos {
        score += weights.break_of_structure;
        confluence.push(format!(
            "Break of structure ({})",
            factors.structure.direction
        ));
        strategy = BOS_STRATEGY;
    }

    if factors.structure.swing != SwingType::None {
        score += weights.swing;
        confluence.push(format!("Market structure ({})", factors.structure.swing));
    }

    if factors.volatility_expanding {
        score += weights.volatility_expansion;
        confluence.push("Volatility expansion (ATR)".to_string());
    }

    if factors.divergence != Divergence::None {
        score += weights.divergence;
        confluence.push(format!("RSI {} divergence", factors.divergence));
    }

    if factors.channel != Channel::None {
        score += weights.channel;
        confluence.push(format!("Channel alignment ({})", factors.channel));
    }

    let mut is_safe = true;
    match factors.news.status {
        NewsStatus::Block => {
            score = 0;
            is_safe = false;
            confluence.push(format!("News block: {}", factors.news.events.join(", ")));
        }
        NewsStatus::Risky => {
            score -= weights.risky_news_penalty;
            confluence.push(format!("News risk: {}", factors.news.events.join(", ")));
        }
        NewsStatus::Safe => {}
    }

    let total_score = score.clamp(0, 100) as u8;
    debug!(raw = score, total_score, is_safe, strategy, "probability scored");

    ProbabilityResult {
        total_score,
        confluence,
        is_safe,
        strategy: strategy.to_string(),
        macro_projection: None,
    }
}
