// =============================================================================
// Consensus decision loop
// =============================================================================
//
// Runs the probability scorer one or more times over a snapshot and either
// accepts the final iteration's result or rejects the cycle.
//
//   1. Fewer than `min_history` base candles       => REJECTED (history)
//   2. Score `iterations` times (see `Resampling`)
//   3. More than `max_deviations` scores further than `tolerance` from the
//      mean                                        => REJECTED (inconsistent)
//   4. Final score >= `accept_threshold` and safe  => ACCEPTED
//   5. ACCEPTED results carry the macro projection
//
// The loop is synchronous and reads only the snapshot it was handed, so
// ingestion cannot interleave with an evaluation.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::market_data::SymbolSnapshot;
use crate::risk_gate::RiskSource;

use super::analysis::{CycleContext, ScoringFactors};
use super::probability::{calculate, ProbabilityResult, ScoringWeights};

/// How the scorer is re-run within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    /// One deterministic evaluation over the full window.
    #[default]
    Single,
    /// `iterations` evaluations; iteration `i` drops the newest
    /// `iterations - 1 - i` base bars, so the last one sees the full window.
    Jackknife,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default)]
    pub resampling: Resampling,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_deviations")]
    pub max_deviations: usize,
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: u8,
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    #[serde(default = "default_max_evaluation_ms")]
    pub max_evaluation_ms: u64,
}

fn default_iterations() -> usize {
    15
}

fn default_tolerance() -> f64 {
    10.0
}

fn default_max_deviations() -> usize {
    3
}

fn default_accept_threshold() -> u8 {
    80
}

fn default_min_history() -> usize {
    200
}

fn default_max_evaluation_ms() -> u64 {
    2_000
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            resampling: Resampling::default(),
            iterations: default_iterations(),
            tolerance: default_tolerance(),
            max_deviations: default_max_deviations(),
            accept_threshold: default_accept_threshold(),
            min_history: default_min_history(),
            max_evaluation_ms: default_max_evaluation_ms(),
        }
    }
}

impl ConsensusConfig {
    fn effective_iterations(&self) -> usize {
        match self.resampling {
            Resampling::Single => 1,
            Resampling::Jackknife => self.iterations.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InsufficientHistory,
    InconsistentConsensus,
    LowScore,
    Unsafe,
    BudgetExceeded,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory => write!(f, "insufficient history"),
            Self::InconsistentConsensus => write!(f, "inconsistent consensus"),
            Self::LowScore => write!(f, "score below threshold"),
            Self::Unsafe => write!(f, "unsafe news window"),
            Self::BudgetExceeded => write!(f, "evaluation budget exceeded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

/// Everything one cycle produced. `result`/`factors` hold the final
/// iteration's values whenever scoring ran at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub symbol: String,
    pub verdict: Verdict,
    pub scores: Vec<u8>,
    pub mean_score: f64,
    pub deviations: usize,
    pub result: Option<ProbabilityResult>,
    pub factors: Option<ScoringFactors>,
    pub elapsed_ms: u64,
}

impl ConsensusReport {
    /// The authoritative result, only when the cycle was accepted.
    pub fn accepted(&self) -> Option<&ProbabilityResult> {
        match self.verdict {
            Verdict::Accepted => self.result.as_ref(),
            Verdict::Rejected(_) => None,
        }
    }

    fn rejected(symbol: &str, reason: RejectReason, started: Instant) -> Self {
        Self {
            symbol: symbol.to_string(),
            verdict: Verdict::Rejected(reason),
            scores: Vec::new(),
            mean_score: 0.0,
            deviations: 0,
            result: None,
            factors: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Run one evaluation cycle for `snapshot`. `risk` is consulted once per
/// scoring call at `now`.
pub fn run_consensus(
    snapshot: &SymbolSnapshot,
    risk: &dyn RiskSource,
    now: DateTime<Utc>,
    weights: &ScoringWeights,
    config: &ConsensusConfig,
) -> ConsensusReport {
    let started = Instant::now();
    let budget = Duration::from_millis(config.max_evaluation_ms);
    let base = snapshot.base();

    if base.len() < config.min_history {
        info!(
            symbol = %snapshot.symbol,
            candles = base.len(),
            required = config.min_history,
            "consensus REJECTED: insufficient history"
        );
        return ConsensusReport::rejected(&snapshot.symbol, RejectReason::InsufficientHistory, started);
    }

    let ctx = CycleContext::from_snapshot(snapshot);
    let iterations = config.effective_iterations();
    let mut scores = Vec::with_capacity(iterations);
    let mut last: Option<(ProbabilityResult, ScoringFactors)> = None;

    for i in 0..iterations {
        let excluded = iterations - 1 - i;
        let window = &base[..base.len().saturating_sub(excluded)];

        let factors = ScoringFactors::gather(window, &ctx, risk.assess(now));
        let result = calculate(&factors, weights);
        debug!(
            symbol = %snapshot.symbol,
            iteration = i,
            window = window.len(),
            score = result.total_score,
            "consensus sample"
        );
        scores.push(result.total_score);
        last = Some((result, factors));

        if started.elapsed() > budget {
            info!(
                symbol = %snapshot.symbol,
                iteration = i,
                budget_ms = config.max_evaluation_ms,
                "consensus REJECTED: evaluation budget exceeded"
            );
            return ConsensusReport::rejected(&snapshot.symbol, RejectReason::BudgetExceeded, started);
        }
    }

    let mean_score = scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64;
    let deviations = scores
        .iter()
        .filter(|&&s| (f64::from(s) - mean_score).abs() > config.tolerance)
        .count();

    let Some((mut result, factors)) = last else {
        return ConsensusReport::rejected(&snapshot.symbol, RejectReason::LowScore, started);
    };

    let verdict = if deviations > config.max_deviations {
        Verdict::Rejected(RejectReason::InconsistentConsensus)
    } else if !result.is_safe {
        Verdict::Rejected(RejectReason::Unsafe)
    } else if result.total_score < config.accept_threshold {
        Verdict::Rejected(RejectReason::LowScore)
    } else {
        Verdict::Accepted
    };

    match verdict {
        Verdict::Accepted => {
            result.macro_projection = Some(ctx.macro_projection.clone());
            info!(
                symbol = %snapshot.symbol,
                score = result.total_score,
                mean = format!("{:.1}", mean_score),
                strategy = %result.strategy,
                "consensus ACCEPTED"
            );
        }
        Verdict::Rejected(reason) => {
            info!(
                symbol = %snapshot.symbol,
                score = result.total_score,
                mean = format!("{:.1}", mean_score),
                deviations,
                %reason,
                "consensus REJECTED"
            );
        }
    }

    ConsensusReport {
        symbol: snapshot.symbol.clone(),
        verdict,
        scores,
        mean_score,
        deviations,
        result: Some(result),
        factors: Some(factors),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Candle, CandleStore, Timeframe};
    use crate::risk_gate::{NewsRisk, NewsStatus};
    use crate::types::Trend;
    use chrono::TimeZone;

    struct FixedRisk(NewsStatus);

    impl RiskSource for FixedRisk {
        fn assess(&self, _now: DateTime<Utc>) -> NewsRisk {
            NewsRisk {
                status: self.0,
                events: vec!["fixed".into()],
            }
        }
    }

    fn quiet_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap()
    }

    fn flat(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64 * 60_000, 100.0, 100.0, 100.0, 100.0, 1.0))
            .collect()
    }

    /// Binary-exact step so every indicator recurrence is noise free.
    fn rising(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + 0.125 * i as f64;
                let open = close - 0.125;
                Candle::new(i as i64 * 60_000, open, close, open, close, 1.0)
            })
            .collect()
    }

    /// The same rising history in every timeframe.
    fn rising_snapshot(n: usize) -> SymbolSnapshot {
        SymbolSnapshot {
            symbol: "BTCUSDT".into(),
            series: Timeframe::ALL.into_iter().map(|tf| (tf, rising(n))).collect(),
        }
    }

    #[test]
    fn short_history_is_rejected() {
        let store = CandleStore::new(500, 200);
        for c in flat(199) {
            store.add_candle("BTCUSDT", Timeframe::M1, c);
        }
        let report = run_consensus(
            &store.snapshot("BTCUSDT"),
            &FixedRisk(NewsStatus::Safe),
            quiet_time(),
            &ScoringWeights::default(),
            &ConsensusConfig::default(),
        );
        assert_eq!(report.verdict, Verdict::Rejected(RejectReason::InsufficientHistory));
        assert!(report.scores.is_empty());
        assert!(report.accepted().is_none());
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let store = CandleStore::new(500, 200);
        let report = run_consensus(
            &store.snapshot("NOPE"),
            &FixedRisk(NewsStatus::Safe),
            quiet_time(),
            &ScoringWeights::default(),
            &ConsensusConfig::default(),
        );
        assert_eq!(report.verdict, Verdict::Rejected(RejectReason::InsufficientHistory));
    }

    #[test]
    fn flat_history_is_rejected_for_low_score() {
        let store = CandleStore::new(500, 200);
        for c in flat(200) {
            store.add_candle("BTCUSDT", Timeframe::M1, c);
        }
        let report = run_consensus(
            &store.snapshot("BTCUSDT"),
            &FixedRisk(NewsStatus::Safe),
            quiet_time(),
            &ScoringWeights::default(),
            &ConsensusConfig::default(),
        );
        assert_eq!(report.verdict, Verdict::Rejected(RejectReason::LowScore));
        let factors = report.factors.unwrap();
        assert_eq!(factors.trend, Trend::Neutral);
        assert!(!factors.structure.bos);
        assert_eq!(report.result.unwrap().total_score, 0);
    }

    #[test]
    fn rising_history_is_accepted_with_macro() {
        let report = run_consensus(
            &rising_snapshot(300),
            &FixedRisk(NewsStatus::Safe),
            quiet_time(),
            &ScoringWeights::default(),
            &ConsensusConfig::default(),
        );
        assert_eq!(report.verdict, Verdict::Accepted);

        let factors = report.factors.as_ref().unwrap();
        assert_eq!(factors.trend, Trend::Bullish);
        assert_eq!(factors.macro_trend, Trend::Bullish);
        assert!(factors.structure.bos);

        let result = report.accepted().unwrap();
        // trend 30 + macro 20 + BOS 25 + HH 10 + channel 10
        assert_eq!(result.total_score, 95);
        assert!(result.is_safe);
        let projection = result.macro_projection.as_ref().unwrap();
        assert_eq!(projection.trend, Trend::Bullish);
        assert_eq!(projection.timeframe, Some(Timeframe::H1));
    }

    #[test]
    fn block_window_rejects_as_unsafe() {
        let report = run_consensus(
            &rising_snapshot(300),
            &FixedRisk(NewsStatus::Block),
            quiet_time(),
            &ScoringWeights::default(),
            &ConsensusConfig::default(),
        );
        assert_eq!(report.verdict, Verdict::Rejected(RejectReason::Unsafe));
        assert_eq!(report.result.as_ref().unwrap().total_score, 0);
        assert!(report.result.unwrap().macro_projection.is_none());
    }

    #[test]
    fn jackknife_on_steady_history_agrees() {
        let config = ConsensusConfig {
            resampling: Resampling::Jackknife,
            ..ConsensusConfig::default()
        };
        let report = run_consensus(
            &rising_snapshot(300),
            &FixedRisk(NewsStatus::Safe),
            quiet_time(),
            &ScoringWeights::default(),
            &config,
        );
        assert_eq!(report.scores.len(), 15);
        assert_eq!(report.deviations, 0);
        assert_eq!(report.verdict, Verdict::Accepted);
    }

    #[test]
    fn jackknife_rejects_unstable_scores() {
        // Rising history whose last 5 bars collapse: early jackknife windows
        // still see the trend, late ones see the break.
        let mut candles = rising(295);
        let mut price = candles[294].close;
        for i in 295..300 {
            let open = price;
            price -= 3.0;
            candles.push(Candle::new(i as i64 * 60_000, open, open, price, price, 1.0));
        }
        let store = CandleStore::new(500, 200);
        for c in candles {
            store.add_candle("BTCUSDT", Timeframe::M1, c);
        }
        let config = ConsensusConfig {
            resampling: Resampling::Jackknife,
            iterations: 15,
            tolerance: 5.0,
            max_deviations: 3,
            ..ConsensusConfig::default()
        };
        let report = run_consensus(
            &store.snapshot("BTCUSDT"),
            &FixedRisk(NewsStatus::Safe),
            quiet_time(),
            &ScoringWeights::default(),
            &config,
        );
        assert_eq!(report.scores.len(), 15);
        assert!(report.deviations > 3, "scores: {:?}", report.scores);
        assert_eq!(report.verdict, Verdict::Rejected(RejectReason::InconsistentConsensus));
    }

    #[test]
    fn zero_budget_is_exceeded() {
        let config = ConsensusConfig {
            max_evaluation_ms: 0,
            ..ConsensusConfig::default()
        };
        let report = run_consensus(
            &rising_snapshot(300),
            &FixedRisk(NewsStatus::Safe),
            quiet_time(),
            &ScoringWeights::default(),
            &config,
        );
        assert_eq!(report.verdict, Verdict::Rejected(RejectReason::BudgetExceeded));
    }

    #[test]
    fn config_defaults_from_empty_json() {
        let cfg: ConsensusConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ConsensusConfig::default());
        let cfg: ConsensusConfig = serde_json::from_str(r#"{"resampling": "jackknife"}"#).unwrap();
        assert_eq!(cfg.resampling, Resampling::Jackknife);
    }
}
