pub mod candle_store;
pub mod kline_stream;
pub mod timeframe;

pub use candle_store::{Candle, CandleStore, SeriesByTimeframe, SymbolSnapshot};
pub use timeframe::Timeframe;
