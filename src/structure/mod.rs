// =============================================================================
// Market structure classification
// =============================================================================
//
// Break of structure, liquidity sweeps, swing type, channels and market
// phase, all derived from a trailing candle window.

pub mod channel;
pub mod detector;
pub mod phase;

pub use channel::{detect_channel, Channel};
pub use detector::{detect_structure, StructureDirection, StructureType, StructureVerdict, SwingType};
pub use phase::{detect_market_phase, MarketPhase};
