use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use super::candle_store::{Candle, CandleStore};
use super::timeframe::Timeframe;

/// One parsed kline event.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineUpdate {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle: Candle,
    pub is_closed: bool,
}

/// Connect to the Binance kline WebSocket for `symbol` at base resolution and
/// append every closed candle to `store`.
///
/// In-progress updates are ignored. Returns when the stream ends or errors so
/// the caller can reconnect.
pub async fn run_kline_stream(symbol: &str, store: &Arc<CandleStore>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!(
        "wss://stream.binance.com:9443/ws/{lower}@kline_{}",
        Timeframe::BASE
    );
    info!(url = %url, symbol = %symbol, "connecting to kline WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to kline WebSocket")?;

    info!(symbol = %symbol, "kline WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_kline_message(&text) {
                        Ok(update) if update.is_closed => {
                            debug!(
                                symbol = %update.symbol,
                                timeframe = %update.timeframe,
                                close = update.candle.close,
                                "closed candle"
                            );
                            store.add_candle(&update.symbol, update.timeframe, update.candle);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "failed to parse kline message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "kline WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "kline WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a kline event. Accepts both the combined-stream envelope
/// (`{"stream": .., "data": {..}}`) and the bare single-stream payload.
pub fn parse_kline_message(text: &str) -> Result<KlineUpdate> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let symbol = data["s"]
        .as_str()
        .context("missing field s")?
        .to_uppercase();

    let k = &data["k"];

    let timeframe: Timeframe = k["i"]
        .as_str()
        .context("missing field k.i")?
        .parse()?;

    let timestamp = k["t"].as_i64().context("missing field k.t")?;
    let open = crate::binance::parse_str_f64(&k["o"]).context("field k.o")?;
    let high = crate::binance::parse_str_f64(&k["h"]).context("field k.h")?;
    let low = crate::binance::parse_str_f64(&k["l"]).context("field k.l")?;
    let close = crate::binance::parse_str_f64(&k["c"]).context("field k.c")?;
    let volume = crate::binance::parse_str_f64(&k["v"]).context("field k.v")?;
    let is_closed = k["x"].as_bool().context("missing field k.x")?;

    Ok(KlineUpdate {
        symbol,
        timeframe,
        candle: Candle::new(timestamp, open, high, low, close, volume),
        is_closed,
    })
}
