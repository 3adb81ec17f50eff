//! 🧠 Position Engine
//!
//! Ties the components together: probabilities, scores, premiums, EVs,
//! the selector and the stop calculator, with the peak tracker and the
//! anti-churn guard as per-symbol state. One call, one snapshot, one
//! decision. Every collaborator is constructed explicitly and injected
//! here; there are no hidden singletons to reach for.
//!
//! Evaluation is a pure synchronous computation. Different symbols may be
//! evaluated concurrently from the host's thread pool; a per-symbol lock
//! serializes racing evaluations of the same symbol so the peak and
//! action state cannot lose updates.

use std::fmt;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{info, warn};

use crate::config::EngineConfig;
use crate::decision_engine::ev::{Action, EvCalculator, EvContext};
use crate::decision_engine::guardrails::{AntiChurnGuard, GuardStats};
use crate::decision_engine::logging::{DecisionLogEntry, DecisionLogger};
use crate::decision_engine::peak_tracker::{PeakRecord, PeakStore, PeakTracker, TrackerStats};
use crate::decision_engine::premiums::{
    default_premiums, evaluate_premiums, PremiumContext, RiskPremium,
};
use crate::decision_engine::probability::ProbabilityModel;
use crate::decision_engine::scoring::ScoreEngine;
use crate::decision_engine::selector::{Decision, DecisionSelector, SelectorInput};
use crate::decision_engine::stops::{DynamicStopCalculator, StopKind};
use crate::snapshot::{MarketSnapshot, SetupType};

/// Rejected input. Missing optional data never lands here; only a
/// snapshot the engine cannot price at all.
#[derive(Debug, Clone)]
pub enum EngineError {
    InvalidSnapshot { reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidSnapshot { reason } => {
                write!(f, "invalid snapshot: {}", reason)
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Engine-wide statistics snapshot
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub peaks: TrackerStats,
    pub guard: GuardStats,
}

/// The position-management decision engine
pub struct PositionEngine {
    config: EngineConfig,
    probability: ProbabilityModel,
    scores: ScoreEngine,
    premiums: Vec<RiskPremium>,
    ev: EvCalculator,
    selector: DecisionSelector,
    stops: DynamicStopCalculator,
    peaks: PeakTracker,
    guard: AntiChurnGuard,
    journal: Option<DecisionLogger>,
    symbol_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PositionEngine {
    pub fn new(store: Box<dyn PeakStore>) -> Self {
        Self::with_config(EngineConfig::default(), store)
    }

    pub fn with_config(config: EngineConfig, store: Box<dyn PeakStore>) -> Self {
        info!("🧠 Position engine starting");
        Self {
            probability: ProbabilityModel::with_config(config.probability.clone()),
            scores: ScoreEngine::with_config(config.scoring.clone()),
            premiums: default_premiums(),
            ev: EvCalculator::with_config(config.ev.clone()),
            selector: DecisionSelector::with_config(config.selector.clone()),
            stops: DynamicStopCalculator::with_config(config.stops.clone()),
            peaks: PeakTracker::with_config(store, config.tracker.clone()),
            guard: AntiChurnGuard::with_config(config.guard.clone()),
            journal: None,
            symbol_locks: DashMap::new(),
            config,
        }
    }

    /// Attach a CSV decision journal
    pub fn with_journal(mut self, journal: DecisionLogger) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Evaluate one open position against one market snapshot.
    ///
    /// Returns the highest-EV action after gating, together with the stop
    /// recommendation. Malformed input is rejected; degraded input (all
    /// HTF trend fields zero) degrades to HOLD.
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
        self.validate(snapshot)?;

        let lock = self.symbol_lock(&snapshot.symbol);
        let _held = lock.lock().unwrap();

        // Missing-data short circuit: no indicator feed, no opinions
        if snapshot.htf_data_missing() {
            warn!(
                "🧠 {} HTF trend data missing, holding without evaluation",
                snapshot.symbol
            );
            let decision = Decision {
                action: Action::Hold,
                ev: 0.0,
                confidence: self.config.selector.confidence_base,
                reasoning: "insufficient data: HTF trend fields are empty".to_string(),
                recommended_stop: snapshot.position.stop_loss,
                should_modify_stop: false,
                stop_kind: StopKind::Unchanged,
            };
            self.journal_decision(snapshot, &decision, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
            return Ok(decision);
        }

        let setup = SetupType::classify(snapshot);
        let profit_pct = snapshot.profit_pct();
        let size_ratio = snapshot.size_ratio();
        let now = snapshot.timestamp.max(0) as u64;

        let peak = self.peaks.observe(
            &snapshot.symbol,
            profit_pct,
            snapshot.current_price,
            snapshot.position.volume,
            now,
        );
        let giveback = peak.record.giveback(profit_pct);

        let probs = self.probability.estimate(snapshot, setup);
        let exit = self.scores.exit_score(snapshot, giveback);
        let entry = self.scores.entry_score(snapshot);
        let exhaustion = self.scores.exhaustion_score(snapshot);

        let premium_ctx = PremiumContext {
            snapshot,
            probs: &probs,
            exhaustion: exhaustion.value,
            profit_pct,
            giveback,
            peak: Some(&peak.record),
            setup,
            size_ratio,
        };
        let premium_report =
            evaluate_premiums(&self.premiums, &premium_ctx, &self.config.premiums);

        let ev_ctx = EvContext {
            snapshot,
            probs: &probs,
            premiums: &premium_report,
            exhaustion: exhaustion.value,
            entry_score: entry.value,
            setup,
            profit_pct,
            size_ratio,
        };
        let report = self.ev.evaluate(&ev_ctx);

        let stop = self.stops.compute(
            snapshot,
            &probs,
            exhaustion.value,
            exit.value,
            setup,
            profit_pct,
        );

        let input = SelectorInput {
            snapshot,
            probs: &probs,
            report: &report,
            setup,
            stop: &stop,
        };
        let decision = self.selector.select(&input, &self.guard);

        info!(
            "🧠 {} [{}] {} ev={:.2}% conf={:.0} stop={:.5} ({})",
            snapshot.symbol,
            setup.as_str(),
            decision.action.as_str(),
            decision.ev,
            decision.confidence,
            decision.recommended_stop,
            probs.breakdown()
        );

        self.journal_decision(
            snapshot,
            &decision,
            report.ev(Action::Hold),
            report.ev(Action::Close),
            probs.continuation,
            probs.reversal,
            probs.thesis_quality,
            exit.value,
            entry.value,
            exhaustion.value,
            premium_report.total,
        );

        Ok(decision)
    }

    /// Tell the engine a position is gone so its per-symbol state follows
    pub fn position_closed(&self, symbol: &str) {
        if let Some(record) = self.peaks.remove(symbol) {
            info!(
                "🧠 {} closed: peak {:.2}%, realized {:.2}%",
                symbol, record.peak_profit_pct, record.realized_profit_pct
            );
        }
        self.guard.clear(symbol);
    }

    /// Current peak record for a symbol, if one is tracked
    pub fn peak(&self, symbol: &str) -> Option<PeakRecord> {
        self.peaks.get(symbol)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            peaks: self.peaks.stats(),
            guard: self.guard.stats(),
        }
    }

    fn validate(&self, snapshot: &MarketSnapshot) -> Result<(), EngineError> {
        let invalid = |reason: &str| {
            Err(EngineError::InvalidSnapshot {
                reason: reason.to_string(),
            })
        };
        if snapshot.symbol.is_empty() {
            return invalid("symbol is empty");
        }
        if !(snapshot.current_price > 0.0) || !snapshot.current_price.is_finite() {
            return invalid("current_price must be positive and finite");
        }
        if !(snapshot.position.volume > 0.0) {
            return invalid("position volume must be positive");
        }
        if !(snapshot.position.entry_price > 0.0) {
            return invalid("entry price must be positive");
        }
        if !(snapshot.account.balance > 0.0) {
            return invalid("account balance must be positive");
        }
        Ok(())
    }

    fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.symbol_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[allow(clippy::too_many_arguments)]
    fn journal_decision(
        &self,
        snapshot: &MarketSnapshot,
        decision: &Decision,
        ev_hold: f64,
        ev_close: f64,
        continuation: f64,
        reversal: f64,
        thesis_quality: f64,
        exit_score: f64,
        entry_score: f64,
        exhaustion: f64,
        premium_total: f64,
    ) {
        let journal = match &self.journal {
            Some(journal) => journal,
            None => return,
        };
        let entry = DecisionLogEntry {
            decision_id: 0,
            timestamp: snapshot.timestamp.max(0) as u64,
            symbol: snapshot.symbol.clone(),
            action: decision.action.as_str(),
            ev: decision.ev,
            ev_hold,
            ev_close,
            continuation,
            reversal,
            thesis_quality,
            exit_score,
            entry_score,
            exhaustion,
            premium_total,
            confidence: decision.confidence,
            recommended_stop: decision.recommended_stop,
            should_modify_stop: decision.should_modify_stop,
            reason: decision.reasoning.clone(),
        };
        if let Err(e) = journal.log_decision(entry) {
            warn!("📝 Journal write failed, continuing: {:#}", e);
        }
    }
}
