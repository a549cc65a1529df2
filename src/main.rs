// =============================================================================
// Confluence Engine — Main Entry Point
// =============================================================================
//
// Backfills candle history over REST, keeps it current from the 1m kline
// stream, and evaluates every configured symbol on a fixed interval. Accepted
// decisions are handed to the signal sink; every cycle lands in the decision
// ring.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alert_sink;
mod app_state;
mod binance;
mod decision_envelope;
mod indicators;
mod levels;
mod market_data;
mod risk_gate;
mod runtime_config;
mod signals;
mod strategy;
mod structure;
mod trend_confluence;
mod types;

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alert_sink::{LogSink, SignalSink};
use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::market_data::Timeframe;
use crate::risk_gate::RiskGate;
use crate::runtime_config::{RuntimeConfig, DEFAULT_CONFIG_PATH};
use crate::strategy::StrategyEngine;

/// Seed every timeframe of `symbol` from REST with closed klines. Coarser
/// series go first so the base seed, which re-anchors the aggregation cadence,
/// lands last.
async fn backfill_symbol(client: &BinanceClient, state: &AppState, symbol: &str) {
    let (base_limit, derived_limit) = {
        let cfg = state.runtime_config.read();
        (cfg.backfill.base_limit, cfg.backfill.derived_limit)
    };

    for tf in Timeframe::ALL.into_iter().rev() {
        let limit = if tf.is_base() { base_limit } else { derived_limit };
        match client.get_klines(symbol, tf, limit).await {
            Ok(candles) => {
                let fetched = candles.len();
                state.candle_store.seed_series(symbol, tf, candles);
                let stored = state.candle_store.get_series(symbol, tf);
                info!(
                    symbol,
                    timeframe = %tf,
                    fetched,
                    stored = stored.len(),
                    last_open = ?stored.last().map(|c| c.timestamp),
                    "backfill complete"
                );
            }
            Err(e) => {
                warn!(symbol, timeframe = %tf, error = %e, "backfill failed");
                state.push_error(Some(symbol), format!("backfill {tf}: {e}"));
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Confluence Engine starting up");

    let config_path =
        std::env::var("CONFLUENCE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(syms) = std::env::var("CONFLUENCE_SYMBOLS") {
        config.apply_symbol_override(&syms);
    }

    info!(
        symbols = ?config.symbols,
        resampling = ?config.consensus.resampling,
        threshold = config.consensus.accept_threshold,
        interval_secs = config.evaluation_interval_secs,
        "Configured symbols"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));
    let symbols = state.runtime_config.read().symbols.clone();

    // ── 3. Backfill history ──────────────────────────────────────────────
    let backfill_enabled = state.runtime_config.read().backfill.enabled;
    if backfill_enabled {
        match BinanceClient::new() {
            Ok(client) => {
                for symbol in &symbols {
                    backfill_symbol(&client, &state, symbol).await;
                }
            }
            Err(e) => error!(error = %e, "Failed to build REST client, skipping backfill"),
        }
    }

    // ── 4. Spawn kline streams ───────────────────────────────────────────
    for symbol in &symbols {
        let stream_state = state.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                let store = stream_state.candle_store.clone();
                if let Err(e) = market_data::kline_stream::run_kline_stream(&sym, &store).await {
                    error!(symbol = %sym, error = %e, "Kline stream error — reconnecting in 5s");
                    stream_state.push_error(Some(sym.as_str()), format!("kline stream: {e}"));
                } else {
                    warn!(symbol = %sym, "Kline stream ended — reconnecting in 5s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });
    }

    info!(count = symbols.len(), "Kline streams launched");

    // ── 5. Evaluation loop ───────────────────────────────────────────────
    let eval_state = state.clone();
    let sink: Arc<dyn SignalSink> = Arc::new(LogSink);
    tokio::spawn(async move {
        let secs = eval_state.runtime_config.read().evaluation_interval_secs.max(1);
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(secs));
        loop {
            interval.tick().await;

            let (syms, windows) = {
                let cfg = eval_state.runtime_config.read();
                (cfg.symbols.clone(), cfg.risk_windows.clone())
            };
            let gate = RiskGate::new(windows);
            let now = chrono::Utc::now();

            for symbol in &syms {
                debug!(
                    symbol = %symbol,
                    price = ?eval_state.candle_store.get_latest_price(symbol),
                    base_candles = eval_state.candle_store.len(symbol, Timeframe::BASE),
                    "evaluating"
                );
                let (envelope, decision) =
                    StrategyEngine::evaluate_symbol(&eval_state, symbol, &gate, now);
                eval_state.push_decision(envelope);

                if let Some(decision) = decision {
                    if let Err(e) = sink.publish(&decision) {
                        warn!(symbol = %symbol, error = %e, "signal publish failed");
                        eval_state.push_error(Some(symbol.as_str()), format!("publish: {e}"));
                    }
                }
            }
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!(
        uptime_secs = state.uptime_secs(),
        decisions = state.recent_decisions.read().len(),
        accepted = state.accepted_count(),
        version = state.current_state_version(),
        "Confluence Engine shut down complete."
    );
    Ok(())
}
