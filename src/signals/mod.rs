// =============================================================================
// Signals Module
// =============================================================================
//
// Scoring pipeline for one evaluation cycle:
// - Factor gathering from a candle snapshot
// - Rule-weighted probability scoring
// - Consensus decision loop

pub mod analysis;
pub mod consensus;
pub mod probability;

pub use consensus::{run_consensus, ConsensusConfig, ConsensusReport, RejectReason, Verdict};
pub use probability::{ProbabilityResult, ScoringWeights};
