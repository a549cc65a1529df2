// =============================================================================
// Decision Envelope — Auditable record of every evaluation cycle
// =============================================================================
//
// Every cycle ends in exactly one envelope: ACCEPT when a signal was
// published, REJECT otherwise. A rejected envelope names the stage that
// stopped it so the recent-decision ring can be audited after the fact.
// =============================================================================

use std::fmt;

use serde::Serialize;

use crate::signals::{ConsensusReport, RejectReason, Verdict};

/// Pipeline stage that stopped a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockingStage {
    /// Not enough base candles.
    History,
    /// Jackknife scores disagreed.
    Consensus,
    /// Final score under the accept threshold.
    Score,
    /// The risk gate returned BLOCK.
    News,
    /// The evaluation overran its time budget.
    Budget,
    /// No price change over the direction lookback.
    Direction,
    /// Same direction as the last published signal.
    Suppressed,
}

impl fmt::Display for BlockingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::History => write!(f, "HISTORY"),
            Self::Consensus => write!(f, "CONSENSUS"),
            Self::Score => write!(f, "SCORE"),
            Self::News => write!(f, "NEWS"),
            Self::Budget => write!(f, "BUDGET"),
            Self::Direction => write!(f, "DIRECTION"),
            Self::Suppressed => write!(f, "SUPPRESSED"),
        }
    }
}

impl From<RejectReason> for BlockingStage {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InsufficientHistory => Self::History,
            RejectReason::InconsistentConsensus => Self::Consensus,
            RejectReason::LowScore => Self::Score,
            RejectReason::Unsafe => Self::News,
            RejectReason::BudgetExceeded => Self::Budget,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinalDecision {
    Accept,
    Reject,
}

/// Complete auditable record of one evaluation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEnvelope {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    pub symbol: String,

    pub final_decision: FinalDecision,

    /// Final iteration's score, when scoring ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,

    /// Mean over all consensus iterations.
    pub mean_score: f64,

    /// Which stage blocked the cycle (if rejected).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_stage: Option<BlockingStage>,

    /// Human-readable reason for a rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub elapsed_ms: u64,

    /// RFC 3339 timestamp of when this decision was created.
    pub created_at: String,
}

impl DecisionEnvelope {
    fn from_report(report: &ConsensusReport) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: report.symbol.clone(),
            final_decision: FinalDecision::Accept,
            score: report.result.as_ref().map(|r| r.total_score),
            mean_score: report.mean_score,
            blocking_stage: None,
            reason: None,
            elapsed_ms: report.elapsed_ms,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Envelope for a report whose verdict was ACCEPTED.
    pub fn accepted(report: &ConsensusReport) -> Self {
        Self::from_report(report)
    }

    /// Envelope for a cycle stopped at `stage`.
    pub fn rejected(
        report: &ConsensusReport,
        stage: BlockingStage,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            final_decision: FinalDecision::Reject,
            blocking_stage: Some(stage),
            reason: Some(reason.into()),
            ..Self::from_report(report)
        }
    }

    /// Map a consensus report straight to an envelope. Rejections keep the
    /// consensus reason; acceptances may still be rejected downstream.
    pub fn from_verdict(report: &ConsensusReport) -> Self {
        match report.verdict {
            Verdict::Accepted => Self::accepted(report),
            Verdict::Rejected(reason) => Self::rejected(report, reason.into(), reason.to_string()),
        }
    }

    pub fn is_accept(&self) -> bool {
        self.final_decision == FinalDecision::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(verdict: Verdict) -> ConsensusReport {
        ConsensusReport {
            symbol: "ETHUSDT".into(),
            verdict,
            scores: vec![85],
            mean_score: 85.0,
            deviations: 0,
            result: None,
            factors: None,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn accepted_envelope() {
        let env = DecisionEnvelope::from_verdict(&report(Verdict::Accepted));
        assert!(env.is_accept());
        assert_eq!(env.symbol, "ETHUSDT");
        assert!(env.blocking_stage.is_none());
        assert!(env.reason.is_none());
        assert_eq!(env.id.len(), 36);
    }

    #[test]
    fn rejection_maps_stage_and_reason() {
        let env = DecisionEnvelope::from_verdict(&report(Verdict::Rejected(RejectReason::Unsafe)));
        assert!(!env.is_accept());
        assert_eq!(env.blocking_stage, Some(BlockingStage::News));
        assert_eq!(env.reason.as_deref(), Some("unsafe news window"));
    }

    #[test]
    fn downstream_rejection() {
        let env = DecisionEnvelope::rejected(
            &report(Verdict::Accepted),
            BlockingStage::Suppressed,
            "repeated BUY",
        );
        assert_eq!(env.final_decision, FinalDecision::Reject);
        assert_eq!(env.blocking_stage, Some(BlockingStage::Suppressed));
    }

    #[test]
    fn serialises_screaming_case() {
        let env = DecisionEnvelope::from_verdict(&report(Verdict::Rejected(
            RejectReason::InsufficientHistory,
        )));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["final_decision"], "REJECT");
        assert_eq!(json["blocking_stage"], "HISTORY");
        assert!(json.get("score").is_none());
    }
}
