//! # position-brain
//!
//! A position-management decision engine: given one open position and a
//! multi-timeframe market snapshot (trend/momentum/volume/structure
//! indicators plus an ML directional prediction), compute the expected
//! value of every candidate action and return the highest-EV action
//! together with a recomputed protective stop.
//!
//! Feature computation, model inference, order execution and capital
//! allocation live elsewhere; this crate is only the decision core that
//! turns a snapshot plus scalar risk signals into one action and one
//! stop price.
//!
//! ```no_run
//! use position_brain::{FilePeakStore, MarketSnapshot, PositionEngine};
//!
//! let engine = PositionEngine::new(Box::new(FilePeakStore::new("peaks.json")));
//! let snapshot: MarketSnapshot = serde_json::from_str("{ /* feed output */ }").unwrap();
//! let decision = engine.evaluate(&snapshot).unwrap();
//! println!("{} -> {}", snapshot.symbol, decision.reasoning);
//! ```

pub mod config;
pub mod decision_engine;
pub mod engine;
pub mod snapshot;

pub use config::EngineConfig;
pub use decision_engine::{
    Action, Decision, DecisionLogger, DynamicStop, FilePeakStore, MemoryPeakStore, PeakRecord,
    PeakStore, ProbabilityEstimate, StopKind,
};
pub use engine::{EngineError, EngineStats, PositionEngine};
pub use snapshot::{MarketSnapshot, SetupType, Side};
