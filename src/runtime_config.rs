// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Every tunable parameter of the confluence engine lives here: symbols, store
// capacities, scoring weights, consensus thresholds, risk windows and the
// evaluation cadence.
//
// Persistence uses an atomic tmp + rename pattern. All fields carry a serde
// default so that adding new fields never breaks loading an older file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::levels::DEFAULT_STOP_ATR_MULTIPLIER;
use crate::risk_gate::{default_risk_windows, RiskWindow};
use crate::signals::{ConsensusConfig, ScoringWeights};

/// Config path used when `CONFLUENCE_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "runtime_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_base_capacity() -> usize {
    500
}

fn default_derived_capacity() -> usize {
    200
}

fn default_base_limit() -> u32 {
    500
}

fn default_derived_limit() -> u32 {
    200
}

fn default_evaluation_interval_secs() -> u64 {
    10
}

fn default_direction_lookback() -> usize {
    20
}

fn default_stop_atr_multiplier() -> f64 {
    DEFAULT_STOP_ATR_MULTIPLIER
}

// =============================================================================
// Sub-sections
// =============================================================================

/// Ring capacities of the candle store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Retained candles for the base (1m) series.
    #[serde(default = "default_base_capacity")]
    pub base_capacity: usize,

    /// Retained candles for every aggregated series.
    #[serde(default = "default_derived_capacity")]
    pub derived_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_capacity: default_base_capacity(),
            derived_capacity: default_derived_capacity(),
        }
    }
}

/// History fetched over REST before the live stream starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Klines requested for the base series.
    #[serde(default = "default_base_limit")]
    pub base_limit: u32,

    /// Klines requested for each coarser series.
    #[serde(default = "default_derived_limit")]
    pub derived_limit: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_limit: default_base_limit(),
            derived_limit: default_derived_limit(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Symbols the engine ingests and evaluates.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,

    #[serde(default)]
    pub scoring: ScoringWeights,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// UTC windows classified RISKY or BLOCK.
    #[serde(default = "default_risk_windows")]
    pub risk_windows: Vec<RiskWindow>,

    /// Seconds between evaluation cycles.
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,

    /// Drop an accepted decision whose direction repeats the previous one
    /// published for the same symbol.
    #[serde(default = "default_true")]
    pub suppress_repeated_direction: bool,

    /// Base bars between the two closes that decide BUY / SELL.
    #[serde(default = "default_direction_lookback")]
    pub direction_lookback: usize,

    /// ATR multiple used as the stop distance (1R) for trade levels.
    #[serde(default = "default_stop_atr_multiplier")]
    pub stop_atr_multiplier: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            store: StoreConfig::default(),
            backfill: BackfillConfig::default(),
            scoring: ScoringWeights::default(),
            consensus: ConsensusConfig::default(),
            risk_windows: default_risk_windows(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            suppress_repeated_direction: true,
            direction_lookback: default_direction_lookback(),
            stop_atr_multiplier: default_stop_atr_multiplier(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing or malformed file is an error so the caller can fall back to
    /// defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            resampling = ?config.consensus.resampling,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Replace the symbol list from a comma separated value (e.g. the
    /// `CONFLUENCE_SYMBOLS` env var). Blank entries are ignored; an all-blank
    /// value leaves the list untouched.
    pub fn apply_symbol_override(&mut self, raw: &str) {
        let symbols: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            self.symbols = symbols;
        }
    }
}
