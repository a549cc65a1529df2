// =============================================================================
// Binance REST API Client — public market data used for history backfill
// =============================================================================

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::market_data::{Candle, Timeframe};

use super::parse_str_f64;

/// Binance caps `limit` on /api/v3/klines at 1000.
const MAX_KLINE_LIMIT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url("https://api.binance.com")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;
        let base_url = base_url.into();

        debug!(base_url = %base_url, "BinanceClient initialised");
        Ok(Self { base_url, client })
    }

    /// GET /api/v3/klines (public, unsigned). The still-open kline that ends
    /// the response is dropped.
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            timeframe,
            limit.clamp(1, MAX_KLINE_LIMIT)
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!(
                "Binance GET /api/v3/klines returned {}: {}",
                status,
                body
            );
        }

        let candles = parse_klines(&body, chrono::Utc::now().timestamp_millis())?;
        debug!(symbol, %timeframe, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

/// Decode Binance's array-of-arrays kline response, keeping only klines whose
/// close time is before `now_ms`.
fn parse_klines(body: &serde_json::Value, now_ms: i64) -> Result<Vec<Candle>> {
    let raw = body
        .as_array()
        .context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry
            .as_array()
            .context("kline entry is not an array")?;

        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let Some(timestamp) = arr[0].as_i64() else {
            warn!("skipping kline entry without open time");
            continue;
        };
        if arr.get(6).and_then(|v| v.as_i64()).is_some_and(|close_time| close_time >= now_ms) {
            debug!(timestamp, "skipping kline that is still open");
            continue;
        }
        candles.push(Candle::new(
            timestamp,
            parse_str_f64(&arr[1])?,
            parse_str_f64(&arr[2])?,
            parse_str_f64(&arr[3])?,
            parse_str_f64(&arr[4])?,
            parse_str_f64(&arr[5])?,
        ));
    }
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_klines_array_response() {
        let body = serde_json::json!([
            [1700000000000i64, "100.0", "101.0", "99.5", "100.5", "3.2", 1700000059999i64, "0", 10, "0", "0", "0"],
            [1700000060000i64, "100.5", "102.0", "100.0", "101.5", "4.0", 1700000119999i64, "0", 12, "0", "0", "0"]
        ]);
        let candles = parse_klines(&body, 1_800_000_000_000).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].timestamp, 1_700_000_060_000);
        assert!((candles[1].close - 101.5).abs() < 1e-10);
    }

    #[test]
    fn short_entries_are_skipped() {
        let body = serde_json::json!([[1700000000000i64, "1.0"]]);
        assert!(parse_klines(&body, 1_800_000_000_000).unwrap().is_empty());
    }

    #[test]
    fn non_array_body_is_an_error() {
        let body = serde_json::json!({"code": -1121, "msg": "Invalid symbol."});
        assert!(parse_klines(&body, 1_800_000_000_000).is_err());
    }

    #[test]
    fn open_kline_is_dropped() {
        let body = serde_json::json!([
            [1700000000000i64, "100.0", "101.0", "99.5", "100.5", "3.2", 1700000059999i64, "0", 10, "0", "0", "0"],
            [1700000060000i64, "100.5", "102.0", "100.0", "101.5", "4.0", 1700000119999i64, "0", 12, "0", "0", "0"]
        ]);
        // 30 s into the second minute.
        let candles = parse_klines(&body, 1_700_000_090_000).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
    }
}
