// =============================================================================
// Central Application State — Confluence Engine
// =============================================================================
//
// Ties the shared pieces together: runtime config, the candle store, the
// recent-decision audit ring and the per-symbol memory of the last published
// direction.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared collections.
//   - The candle store manages its own interior mutability behind an Arc.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::decision_envelope::DecisionEnvelope;
use crate::market_data::CandleStore;
use crate::runtime_config::RuntimeConfig;
use crate::types::Direction;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded boundary failure (stream drop, backfill error).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Symbol the failure belongs to, if any.
    pub symbol: Option<String>,
    /// RFC 3339 timestamp.
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;
/// Maximum number of recent decisions to retain.
const MAX_RECENT_DECISIONS: usize = 100;

/// Shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every recorded decision or error.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Market Data ─────────────────────────────────────────────────────
    pub candle_store: Arc<CandleStore>,

    // ── Signal memory ───────────────────────────────────────────────────
    /// Direction of the last signal published per symbol.
    pub last_direction: RwLock<HashMap<String, Direction>>,

    // ── Decision Audit Trail ────────────────────────────────────────────
    pub recent_decisions: RwLock<Vec<DecisionEnvelope>>,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the shared state. Store capacities come from `config.store`.
    pub fn new(config: RuntimeConfig) -> Self {
        let candle_store = CandleStore::new(
            config.store.base_capacity,
            config.store.derived_capacity,
        );

        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            candle_store: Arc::new(candle_store),
            last_direction: RwLock::new(HashMap::new()),
            recent_decisions: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error. The ring is capped at [`MAX_RECENT_ERRORS`]; oldest
    /// entries are evicted first.
    pub fn push_error(&self, symbol: Option<&str>, msg: String) {
        let record = ErrorRecord {
            message: msg,
            symbol: symbol.map(str::to_string),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }

        self.increment_version();
    }

    // ── Decision Audit ──────────────────────────────────────────────────

    /// Record a decision envelope. The ring is capped at
    /// [`MAX_RECENT_DECISIONS`]; oldest entries are evicted first.
    pub fn push_decision(&self, envelope: DecisionEnvelope) {
        let mut decisions = self.recent_decisions.write();
        decisions.push(envelope);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.remove(0);
        }

        self.increment_version();
    }

    /// Count of ACCEPT envelopes currently in the ring.
    pub fn accepted_count(&self) -> usize {
        self.recent_decisions
            .read()
            .iter()
            .filter(|d| d.is_accept())
            .count()
    }

    // ── Direction memory ────────────────────────────────────────────────

    /// True when `direction` repeats the last published direction for
    /// `symbol`.
    pub fn is_repeated_direction(&self, symbol: &str, direction: Direction) -> bool {
        self.last_direction.read().get(symbol) == Some(&direction)
    }

    pub fn record_direction(&self, symbol: &str, direction: Direction) {
        self.last_direction
            .write()
            .insert(symbol.to_string(), direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{ConsensusReport, RejectReason, Verdict};

    fn report() -> ConsensusReport {
        ConsensusReport {
            symbol: "BTCUSDT".into(),
            verdict: Verdict::Rejected(RejectReason::LowScore),
            scores: vec![10],
            mean_score: 10.0,
            deviations: 0,
            result: None,
            factors: None,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn store_uses_configured_capacity() {
        let mut cfg = RuntimeConfig::default();
        cfg.store.base_capacity = 3;
        let state = AppState::new(cfg);
        for i in 0..5 {
            let c = crate::market_data::Candle::new(i * 60_000, 1.0, 1.0, 1.0, 1.0, 1.0);
            state.candle_store.add_candle("BTCUSDT", crate::market_data::Timeframe::M1, c);
        }
        assert_eq!(state.candle_store.len("BTCUSDT", crate::market_data::Timeframe::M1), 3);
    }

    #[test]
    fn decision_ring_is_bounded() {
        let state = AppState::new(RuntimeConfig::default());
        let v0 = state.current_state_version();
        for _ in 0..(MAX_RECENT_DECISIONS + 5) {
            state.push_decision(DecisionEnvelope::from_verdict(&report()));
        }
        assert_eq!(state.recent_decisions.read().len(), MAX_RECENT_DECISIONS);
        assert_eq!(state.accepted_count(), 0);
        assert_eq!(
            state.current_state_version(),
            v0 + MAX_RECENT_DECISIONS as u64 + 5
        );
    }

    #[test]
    fn error_ring_is_bounded() {
        let state = AppState::new(RuntimeConfig::default());
        for i in 0..(MAX_RECENT_ERRORS + 1) {
            state.push_error(Some("BTCUSDT"), format!("err {i}"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "err 1");
    }

    #[test]
    fn direction_memory() {
        let state = AppState::new(RuntimeConfig::default());
        assert!(!state.is_repeated_direction("BTCUSDT", Direction::Buy));
        state.record_direction("BTCUSDT", Direction::Buy);
        assert!(state.is_repeated_direction("BTCUSDT", Direction::Buy));
        assert!(!state.is_repeated_direction("BTCUSDT", Direction::Sell));
        assert!(!state.is_repeated_direction("ETHUSDT", Direction::Buy));
    }
}
