use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::timeframe::Timeframe;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle. `timestamp` is the candle open time in epoch ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// `high >= max(open, close)`, `low <= min(open, close)`, finite prices
    /// and non-negative volume.
    pub fn is_valid(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.volume >= 0.0
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl CandleKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Candle series of one symbol, keyed by timeframe (oldest-first vectors).
pub type SeriesByTimeframe = BTreeMap<Timeframe, Vec<Candle>>;

/// Point-in-time copy of every series of one symbol. Evaluation cycles run
/// against a snapshot so that concurrent ingestion cannot change the data
/// underneath a scorer call.
#[derive(Debug, Clone, Default)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub series: SeriesByTimeframe,
}

impl SymbolSnapshot {
    /// Series for `timeframe`; empty when nothing has been stored.
    pub fn get(&self, timeframe: Timeframe) -> &[Candle] {
        self.series.get(&timeframe).map_or(&[], Vec::as_slice)
    }

    pub fn base(&self) -> &[Candle] {
        self.get(Timeframe::BASE)
    }

    /// Close of the most recent base-resolution candle.
    pub fn latest_price(&self) -> Option<f64> {
        self.base().last().map(|c| c.close)
    }
}

// ---------------------------------------------------------------------------
// CandleStore -- bounded ring per (symbol, timeframe) with 1m aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SymbolSeries {
    rings: HashMap<Timeframe, VecDeque<Candle>>,
    /// Base candles appended since the base series was created or seeded.
    /// Drives the aggregation cadence once the base ring starts evicting.
    base_appended: u64,
}

impl SymbolSeries {
    fn new(base_capacity: usize, derived_capacity: usize) -> Self {
        let rings = Timeframe::ALL
            .into_iter()
            .map(|tf| {
                let cap = if tf.is_base() { base_capacity } else { derived_capacity };
                (tf, VecDeque::with_capacity(cap + 1))
            })
            .collect();
        Self {
            rings,
            base_appended: 0,
        }
    }
}

/// Thread-safe store of bounded candle series per `(symbol, timeframe)`.
///
/// Base-resolution writes are aggregated into every coarser timeframe before
/// `add_candle` returns. Series are created lazily on the first write for a
/// symbol and only ever grow by append (oldest entries are evicted once the
/// ring exceeds its capacity).
pub struct CandleStore {
    symbols: RwLock<HashMap<String, SymbolSeries>>,
    base_capacity: usize,
    derived_capacity: usize,
}

impl CandleStore {
    /// Create a store retaining `base_capacity` base candles and
    /// `derived_capacity` candles for each aggregated timeframe.
    pub fn new(base_capacity: usize, derived_capacity: usize) -> Self {
        Self {
            symbols: RwLock::new(HashMap::new()),
            base_capacity: base_capacity.max(1),
            derived_capacity: derived_capacity.max(1),
        }
    }

    fn capacity(&self, timeframe: Timeframe) -> usize {
        if timeframe.is_base() {
            self.base_capacity
        } else {
            self.derived_capacity
        }
    }

    /// Append `candle` to the `(symbol, timeframe)` series, evicting the oldest
    /// entry when over capacity. Base-resolution writes also refresh the
    /// aggregated timeframes.
    ///
    /// Malformed candles and candles older than the last stored one are
    /// dropped with a warning. A candle with the same open time as the last
    /// stored one replaces it and does not advance the aggregation cadence.
    pub fn add_candle(&self, symbol: &str, timeframe: Timeframe, candle: Candle) {
        if !candle.is_valid() {
            warn!(key = %CandleKey::new(symbol, timeframe), ?candle, "dropping malformed candle");
            return;
        }

        let mut map = self.symbols.write();
        let series = map
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolSeries::new(self.base_capacity, self.derived_capacity));

        let cap = self.capacity(timeframe);
        let ring = series.rings.entry(timeframe).or_default();

        if let Some(last) = ring.back_mut() {
            if candle.timestamp < last.timestamp {
                warn!(
                    key = %CandleKey::new(symbol, timeframe),
                    last = last.timestamp,
                    incoming = candle.timestamp,
                    "dropping out-of-order candle"
                );
                return;
            }
            // Finalized version of the in-progress candle seeded from history.
            if candle.timestamp == last.timestamp {
                debug!(
                    key = %CandleKey::new(symbol, timeframe),
                    timestamp = candle.timestamp,
                    "replacing candle with same open time"
                );
                *last = candle;
                return;
            }
        }

        ring.push_back(candle);
        while ring.len() > cap {
            ring.pop_front();
        }

        if timeframe.is_base() {
            series.base_appended += 1;
            for target in Timeframe::derived() {
                aggregate_into(series, target, self.derived_capacity, symbol);
            }
        }
    }

    /// Replace a series wholesale with historical candles (keeps the most
    /// recent `capacity` of them). Does not aggregate; seeding the base series
    /// re-anchors the aggregation cadence to the clock so that later
    /// aggregates start on timeframe boundaries.
    pub fn seed_series(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let cap = self.capacity(timeframe);
        let mut valid: Vec<Candle> = candles.into_iter().filter(Candle::is_valid).collect();
        valid.sort_by_key(|c| c.timestamp);
        let start = valid.len().saturating_sub(cap);

        let mut map = self.symbols.write();
        let series = map
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolSeries::new(self.base_capacity, self.derived_capacity));

        let ring: VecDeque<Candle> = valid[start..].iter().copied().collect();
        debug!(key = %CandleKey::new(symbol, timeframe), count = ring.len(), "series seeded");
        if timeframe.is_base() {
            series.base_appended = ring.back().map_or(0, |last| cadence_anchor(last.timestamp));
        }
        series.rings.insert(timeframe, ring);
    }

    /// Current series (oldest first). Unknown symbols yield an empty series.
    pub fn get_series(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        let map = self.symbols.read();
        map.get(symbol)
            .and_then(|s| s.rings.get(&timeframe))
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Close of the most recent base-resolution candle, if any.
    pub fn get_latest_price(&self, symbol: &str) -> Option<f64> {
        let map = self.symbols.read();
        map.get(symbol)
            .and_then(|s| s.rings.get(&Timeframe::BASE))
            .and_then(|ring| ring.back())
            .map(|c| c.close)
    }

    pub fn len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        let map = self.symbols.read();
        map.get(symbol)
            .and_then(|s| s.rings.get(&timeframe))
            .map_or(0, VecDeque::len)
    }

    /// Copy every series of `symbol` under a single read lock.
    pub fn snapshot(&self, symbol: &str) -> SymbolSnapshot {
        let map = self.symbols.read();
        let series = match map.get(symbol) {
            Some(s) => Timeframe::ALL
                .into_iter()
                .map(|tf| {
                    let candles = s
                        .rings
                        .get(&tf)
                        .map(|ring| ring.iter().copied().collect())
                        .unwrap_or_default();
                    (tf, candles)
                })
                .collect(),
            None => Timeframe::ALL.into_iter().map(|tf| (tf, Vec::new())).collect(),
        };
        SymbolSnapshot {
            symbol: symbol.to_string(),
            series,
        }
    }
}

/// Base minutes of the current hour that are complete once the base candle
/// opening at `timestamp` closes.
fn cadence_anchor(timestamp: i64) -> u64 {
    let hour = Timeframe::H1.base_multiple() as i64;
    let minutes = timestamp.div_euclid(Timeframe::BASE.minutes() as i64 * 60_000) + 1;
    minutes.rem_euclid(hour) as u64
}

/// Build one `target` candle from the trailing base window when the cadence
/// lines up. Skipped when the last stored aggregate already has this (or a
/// later) timestamp, so re-running on the same window never duplicates.
fn aggregate_into(series: &mut SymbolSeries, target: Timeframe, capacity: usize, symbol: &str) {
    let count = target.base_multiple();
    if series.base_appended % count as u64 != 0 {
        return;
    }

    let aggregated = {
        let Some(base) = series.rings.get(&Timeframe::BASE) else {
            return;
        };
        if base.len() < count {
            return;
        }
        let window = base.range(base.len() - count..);
        let mut candle: Option<Candle> = None;
        for c in window {
            candle = Some(match candle {
                None => *c,
                Some(acc) => Candle {
                    timestamp: acc.timestamp,
                    open: acc.open,
                    high: acc.high.max(c.high),
                    low: acc.low.min(c.low),
                    close: c.close,
                    volume: acc.volume + c.volume,
                },
            });
        }
        match candle {
            Some(c) => c,
            None => return,
        }
    };

    let ring = series.rings.entry(target).or_default();
    if ring.back().is_some_and(|last| last.timestamp >= aggregated.timestamp) {
        return;
    }
    ring.push_back(aggregated);
    while ring.len() > capacity {
        ring.pop_front();
    }
    debug!(
        key = %CandleKey::new(symbol, target),
        timestamp = aggregated.timestamp,
        close = aggregated.close,
        "aggregated candle appended"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
