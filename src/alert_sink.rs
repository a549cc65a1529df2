// =============================================================================
// Signal boundary — outbound decision object and sinks
// =============================================================================
//
// The engine hands every published signal to a `SignalSink`. Formatting and
// delivery live on the other side of the trait; the bundled `LogSink` only
// emits the decision through `tracing`.
// =============================================================================

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::levels::TradeLevels;
use crate::signals::ProbabilityResult;
use crate::structure::MarketPhase;
use crate::trend_confluence::MacroProjection;
use crate::types::{Direction, RiskLevel};

/// A published, accepted signal.
#[derive(Debug, Clone, Serialize)]
pub struct SignalDecision {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    /// Final consensus score in [0, 100].
    pub confidence: u8,
    /// Ordered confluence reasons.
    pub confluence: Vec<String>,
    pub strategy: String,
    pub risk_level: RiskLevel,
    /// EXPANSION / COMPRESSION / UNCLEAR.
    pub market_phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macro_projection: Option<MacroProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<TradeLevels>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl SignalDecision {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        result: &ProbabilityResult,
        phase: MarketPhase,
        levels: Option<TradeLevels>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            confidence: result.total_score,
            confluence: result.confluence.clone(),
            strategy: result.strategy.clone(),
            risk_level: RiskLevel::from_score(result.total_score),
            market_phase: phase.label().to_string(),
            macro_projection: result.macro_projection.clone(),
            levels,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Receiver of published signals.
pub trait SignalSink: Send + Sync {
    fn publish(&self, decision: &SignalDecision) -> Result<()>;
}

/// Sink that writes each decision to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SignalSink for LogSink {
    fn publish(&self, decision: &SignalDecision) -> Result<()> {
        let (stop_loss, take_profit, reward_ratio) = match &decision.levels {
            Some(l) => (
                Some(l.stop_loss),
                Some(l.take_profits[0]),
                Some(l.max_reward_ratio()),
            ),
            None => (None, None, None),
        };
        info!(
            id = %decision.id,
            symbol = %decision.symbol,
            direction = %decision.direction,
            confidence = decision.confidence,
            risk = ?decision.risk_level,
            strategy = %decision.strategy,
            phase = %decision.market_phase,
            stop_loss = ?stop_loss,
            take_profit = ?take_profit,
            reward_ratio = ?reward_ratio,
            confluence = ?decision.confluence,
            "SIGNAL"
        );
        Ok(())
    }
}
