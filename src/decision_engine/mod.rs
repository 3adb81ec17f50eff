pub mod probability;
pub mod scoring;
pub mod premiums;
pub mod ev;
pub mod selector;
pub mod stops;
pub mod peak_tracker;
pub mod guardrails;
pub mod logging;

// Re-export main types for convenience
pub use probability::{ProbabilityEstimate, ProbabilityModel};
pub use scoring::{Score, ScoreEngine};
pub use premiums::{
    default_premiums, evaluate_premiums, PremiumContext, PremiumReport, RiskPremium,
};
pub use ev::{Action, ActionCandidate, EvCalculator, EvContext, EvReport};
pub use selector::{Decision, DecisionSelector, SelectorInput};
pub use stops::{DynamicStop, DynamicStopCalculator, StopKind};
pub use peak_tracker::{
    FilePeakStore, MemoryPeakStore, PeakRecord, PeakStore, PeakTracker, PeakUpdate, TrackerStats,
};
pub use guardrails::{ActionState, AntiChurnGuard, GuardStats};
pub use logging::{DecisionLogEntry, DecisionLogger};
