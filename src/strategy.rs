// =============================================================================
// Strategy Engine — one evaluation cycle per symbol
// =============================================================================
//
// Pipeline:
//   1. Snapshot every timeframe for the symbol under one read lock
//   2. Run the consensus loop (history guard, scoring, news gate, threshold)
//   3. Derive BUY / SELL from the close `direction_lookback` base bars ago
//   4. Suppress a direction that repeats the last published one
//   5. Compute trade levels from base ATR and attach structure levels
//   6. Output DecisionEnvelope + optional SignalDecision
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::alert_sink::SignalDecision;
use crate::app_state::AppState;
use crate::decision_envelope::{BlockingStage, DecisionEnvelope};
use crate::indicators::rsi;
use crate::levels::TradeLevels;
use crate::market_data::Candle;
use crate::risk_gate::RiskSource;
use crate::signals::{run_consensus, Verdict};
use crate::types::Direction;

/// Sign of `close[last] - close[last - lookback]`. `None` for a flat delta
/// or a window too short to look back over.
pub fn derive_direction(base: &[Candle], lookback: usize) -> Option<Direction> {
    if lookback == 0 || base.len() <= lookback {
        return None;
    }
    let last = base[base.len() - 1].close;
    let earlier = base[base.len() - 1 - lookback].close;
    let delta = last - earlier;

    if delta > 0.0 {
        Some(Direction::Buy)
    } else if delta < 0.0 {
        Some(Direction::Sell)
    } else {
        None
    }
}

pub struct StrategyEngine;

impl StrategyEngine {
    /// Evaluate `symbol` at `now`. The returned envelope is always produced;
    /// the decision only when a signal should be published. A published
    /// direction is remembered for suppression.
    pub fn evaluate_symbol(
        state: &Arc<AppState>,
        symbol: &str,
        risk: &dyn RiskSource,
        now: DateTime<Utc>,
    ) -> (DecisionEnvelope, Option<SignalDecision>) {
        let config = state.runtime_config.read().clone();

        // ── 1. Snapshot ──────────────────────────────────────────────────
        let snapshot = state.candle_store.snapshot(symbol);

        // ── 2. Consensus ─────────────────────────────────────────────────
        let report = run_consensus(&snapshot, risk, now, &config.scoring, &config.consensus);
        if report.verdict != Verdict::Accepted {
            return (DecisionEnvelope::from_verdict(&report), None);
        }
        let (Some(result), Some(factors)) = (report.accepted(), report.factors.as_ref()) else {
            return (DecisionEnvelope::from_verdict(&report), None);
        };

        // ── 3. Direction ─────────────────────────────────────────────────
        let base = snapshot.base();
        let Some(direction) = derive_direction(base, config.direction_lookback) else {
            let envelope = DecisionEnvelope::rejected(
                &report,
                BlockingStage::Direction,
                format!("No price change over {} bars", config.direction_lookback),
            );
            return (envelope, None);
        };

        // ── 4. Repeated-direction suppression ────────────────────────────
        if config.suppress_repeated_direction && state.is_repeated_direction(symbol, direction) {
            debug!(symbol, %direction, "signal suppressed: repeated direction");
            let envelope = DecisionEnvelope::rejected(
                &report,
                BlockingStage::Suppressed,
                format!("Repeated {direction} signal"),
            );
            return (envelope, None);
        }

        // ── 5. Levels ────────────────────────────────────────────────────
        let entry = snapshot.latest_price().unwrap_or(0.0);
        let levels = factors
            .atr
            .and_then(|atr| TradeLevels::from_atr(direction, entry, atr, config.stop_atr_multiplier))
            .map(|l| l.with_structure(&factors.structure));

        // ── 6. Decision ──────────────────────────────────────────────────
        let decision = SignalDecision::new(symbol, direction, result, factors.phase, levels);
        state.record_direction(symbol, direction);

        let mut envelope = DecisionEnvelope::accepted(&report);
        envelope.reason = Some(format!(
            "{} | Score {} | {} | Phase {}",
            direction, result.total_score, result.strategy, factors.phase
        ));

        let closes: Vec<f64> = base.iter().map(|c| c.close).collect();
        let (rsi_value, rsi_state) = match rsi::current_rsi(&closes, rsi::DEFAULT_PERIOD) {
            Some((v, label)) => (Some(v), label),
            None => (None, "NEUTRAL"),
        };

        info!(
            symbol,
            %direction,
            score = result.total_score,
            strategy = %result.strategy,
            entry,
            rsi = ?rsi_value,
            rsi_state,
            compressing = factors.volatility_compressing,
            stop_loss = ?decision.levels.as_ref().map(|l| l.stop_loss),
            "signal decision generated"
        );

        (envelope, Some(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_envelope::FinalDecision;
    use crate::market_data::Timeframe;
    use crate::risk_gate::RiskGate;
    use crate::runtime_config::RuntimeConfig;
    use chrono::TimeZone;

    fn quiet_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap()
    }

    fn candle(i: usize, close: f64) -> Candle {
        Candle::new(i as i64 * 60_000, close, close, close, close, 1.0)
    }

    fn rising(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + 0.125 * i as f64;
                let open = close - 0.125;
                Candle::new(i as i64 * 60_000, open, close, open, close, 1.0)
            })
            .collect()
    }

    fn rising_state(config: RuntimeConfig) -> Arc<AppState> {
        let state = Arc::new(AppState::new(config));
        for tf in Timeframe::ALL {
            state.candle_store.seed_series("BTCUSDT", tf, rising(300));
        }
        state
    }

    #[test]
    fn direction_from_close_delta() {
        let up: Vec<Candle> = (0..30).map(|i| candle(i, 100.0 + i as f64)).collect();
        let down: Vec<Candle> = (0..30).map(|i| candle(i, 100.0 - i as f64)).collect();
        let flat: Vec<Candle> = (0..30).map(|i| candle(i, 100.0)).collect();

        assert_eq!(derive_direction(&up, 20), Some(Direction::Buy));
        assert_eq!(derive_direction(&down, 20), Some(Direction::Sell));
        assert_eq!(derive_direction(&flat, 20), None);
        assert_eq!(derive_direction(&up[..20], 20), None);
        assert_eq!(derive_direction(&up, 0), None);
    }

    #[test]
    fn rising_market_publishes_buy() {
        let state = rising_state(RuntimeConfig::default());
        let (envelope, decision) =
            StrategyEngine::evaluate_symbol(&state, "BTCUSDT", &RiskGate::new(vec![]), quiet_time());

        assert_eq!(envelope.final_decision, FinalDecision::Accept);
        let decision = decision.unwrap();
        assert_eq!(decision.direction, Direction::Buy);
        assert_eq!(decision.confidence, 95);
        assert!(decision.macro_projection.is_some());

        let levels = decision.levels.unwrap();
        assert!((levels.entry - (100.0 + 0.125 * 299.0)).abs() < 1e-10);
        assert!(levels.stop_loss < levels.entry);
        assert!(levels.take_profits[0] > levels.entry);
        assert!(levels.bos_level.is_some());

        assert!(state.is_repeated_direction("BTCUSDT", Direction::Buy));
    }

    #[test]
    fn repeated_direction_is_suppressed() {
        let state = rising_state(RuntimeConfig::default());
        let risk = RiskGate::new(vec![]);
        let (_, first) = StrategyEngine::evaluate_symbol(&state, "BTCUSDT", &risk, quiet_time());
        assert!(first.is_some());

        let (envelope, second) =
            StrategyEngine::evaluate_symbol(&state, "BTCUSDT", &risk, quiet_time());
        assert!(second.is_none());
        assert_eq!(envelope.blocking_stage, Some(BlockingStage::Suppressed));
    }

    #[test]
    fn suppression_can_be_disabled() {
        let config = RuntimeConfig {
            suppress_repeated_direction: false,
            ..RuntimeConfig::default()
        };
        let state = rising_state(config);
        let risk = RiskGate::new(vec![]);
        let _ = StrategyEngine::evaluate_symbol(&state, "BTCUSDT", &risk, quiet_time());
        let (_, second) = StrategyEngine::evaluate_symbol(&state, "BTCUSDT", &risk, quiet_time());
        assert!(second.is_some());
    }

    #[test]
    fn empty_store_is_rejected_for_history() {
        let state = Arc::new(AppState::new(RuntimeConfig::default()));
        let (envelope, decision) =
            StrategyEngine::evaluate_symbol(&state, "BTCUSDT", &RiskGate::default(), quiet_time());
        assert!(decision.is_none());
        assert_eq!(envelope.blocking_stage, Some(BlockingStage::History));
    }

    #[test]
    fn block_window_rejects_as_news() {
        let state = rising_state(RuntimeConfig::default());
        let blocked = Utc.with_ymd_and_hms(2024, 3, 12, 13, 30, 0).unwrap();
        let (envelope, decision) =
            StrategyEngine::evaluate_symbol(&state, "BTCUSDT", &RiskGate::default(), blocked);
        assert!(decision.is_none());
        assert_eq!(envelope.blocking_stage, Some(BlockingStage::News));
    }
}
