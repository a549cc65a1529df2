// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the
// confluence scorer. Series outputs are index-aligned with their input and
// use `None` for positions that are not yet computable.

pub mod atr;
pub mod divergence;
pub mod ema;
pub mod rsi;

pub use divergence::Divergence;
