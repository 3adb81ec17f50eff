//! 🛑 Dynamic Stop Calculator
//!
//! Computes the protective stop independently of the action decision:
//! a structure stop beyond the nearest S/R level when one is usable, an
//! ATR stop otherwise, both scaled by the probability estimate and the
//! exit score. A trailing subsystem locks in part of the move once its
//! activation score clears the setup's threshold, and a breakeven stop
//! arms when the protection score says the profit is worth defending.
//! The most protective of the three wins, and the result is always
//! validated to the correct side of price.

use log::{debug, warn};

use crate::config::StopConfig;
use crate::decision_engine::probability::ProbabilityEstimate;
use crate::snapshot::{MarketSnapshot, SetupType, Side};

/// Which subsystem produced the recommended stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Beyond the nearest structural level plus buffer
    Structure,

    /// ATR multiple of the setup's effective volatility
    Volatility,

    /// Locking a fraction of the favorable move
    Trailing,

    /// Entry plus a small buffer
    Breakeven,

    /// No recomputation happened (missing-data short circuit)
    Unchanged,
}

impl StopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopKind::Structure => "structure",
            StopKind::Volatility => "volatility",
            StopKind::Trailing => "trailing",
            StopKind::Breakeven => "breakeven",
            StopKind::Unchanged => "unchanged",
        }
    }
}

/// One stop recommendation
#[derive(Debug, Clone)]
pub struct DynamicStop {
    /// Price to place the stop at
    pub recommended_stop: f64,

    pub kind: StopKind,

    /// Set only when the engine's own scoring prefers moving the stop
    pub should_modify: bool,

    /// Trailing activation score that was computed, 0-1
    pub trail_score: f64,

    /// Breakeven protection score that was computed, 0-1
    pub protection_score: f64,

    /// Compact string for the decision journal
    pub breakdown: String,
}

/// Computes protective stops from structure, volatility and probabilities
pub struct DynamicStopCalculator {
    config: StopConfig,
}

impl DynamicStopCalculator {
    pub fn new() -> Self {
        Self::with_config(StopConfig::default())
    }

    pub fn with_config(config: StopConfig) -> Self {
        Self { config }
    }

    pub fn compute(
        &self,
        snapshot: &MarketSnapshot,
        probs: &ProbabilityEstimate,
        exhaustion: f64,
        exit_score: f64,
        setup: SetupType,
        profit_pct: f64,
    ) -> DynamicStop {
        let cfg = &self.config;
        let price = snapshot.current_price;
        let direction = snapshot.direction();
        let entry = snapshot.position.entry_price;

        let eff_vol = self.effective_volatility(snapshot, setup);

        // Base stop: structure preferred, ATR fallback
        let (base_distance, mut kind) = self.base_distance(snapshot, eff_vol);
        let factor = (1.0
            + cfg.continuation_widen * (probs.continuation - 0.5) * 2.0
            - cfg.reversal_tighten * probs.reversal
            - cfg.exit_score_tighten * exit_score)
            .clamp(cfg.scale_factor_min, cfg.scale_factor_max);
        let mut stop = price - direction * base_distance * factor;

        let favorable_move = (price - entry) * direction;
        let divergence = snapshot.volume.volume_divergence.clamp(0.0, 1.0);

        // Trailing: lock a slice of the move once the chart starts arguing
        let trail_score = (cfg.trail_reversal_weight * probs.reversal
            + cfg.trail_weak_continuation_weight * (1.0 - probs.continuation)
            + cfg.trail_divergence_weight * divergence
            + cfg.trail_ml_weight * snapshot.ml_disagreement()
            + cfg.trail_profit_weight
                * (profit_pct / cfg.trail_profit_norm_pct).clamp(0.0, 1.0))
        .clamp(0.0, 1.0);
        let trail_threshold =
            self.trail_threshold(setup) - cfg.trail_exhaustion_adjust * exhaustion;
        if trail_score >= trail_threshold && favorable_move > 0.0 {
            let lock = (self.trail_lock(setup)
                + cfg.trail_lock_score_bonus * (trail_score - trail_threshold))
                .clamp(0.0, 0.9);
            let trailing = entry + direction * favorable_move * lock;
            if (trailing - stop) * direction > 0.0 {
                stop = trailing;
                kind = StopKind::Trailing;
            }
        }

        // Breakeven: defend a real profit when the warnings stack up
        let adverse_structure = (-snapshot.structure.structure_break * direction).max(0.0);
        let protection_score = (cfg.breakeven_divergence_weight * divergence
            + cfg.breakeven_structure_weight * adverse_structure
            + cfg.breakeven_reversal_weight * probs.reversal)
            .clamp(0.0, 1.0);
        if protection_score >= cfg.breakeven_threshold
            && profit_pct >= cfg.breakeven_min_profit_pct
            && favorable_move > 0.0
        {
            let breakeven = entry + direction * cfg.breakeven_buffer_atr * eff_vol;
            if (breakeven - stop) * direction > 0.0 {
                stop = breakeven;
                kind = StopKind::Breakeven;
            }
        }

        // Never suffocate the position
        let min_gap = cfg.min_stop_distance_atr * eff_vol;
        let limit = price - direction * min_gap;
        if (stop - limit) * direction > 0.0 {
            stop = limit;
        }

        // Side invariant: long stops below price, short stops above
        if (price - stop) * direction <= 0.0 {
            warn!(
                "{} stop {:.5} landed on the wrong side of {:.5}, clamping",
                snapshot.symbol, stop, price
            );
            stop = price - direction * min_gap.max(eff_vol);
        }

        let should_modify = self.should_modify(snapshot, probs, stop, price, direction, eff_vol);

        let breakdown = format!(
            "stop={:.5} kind={} dist_atr={:.2} factor={:.2} trail={:.2}/{:.2} protect={:.2} modify={}",
            stop,
            kind.as_str(),
            (price - stop).abs() / eff_vol,
            factor,
            trail_score,
            trail_threshold,
            protection_score,
            should_modify
        );
        debug!("{} {}", snapshot.symbol, breakdown);

        DynamicStop {
            recommended_stop: stop,
            kind,
            should_modify,
            trail_score,
            protection_score,
            breakdown,
        }
    }

    /// Blend of the setup's canonical timeframe ATRs, with a price-fraction
    /// fallback when the feed carries no volatility at all.
    fn effective_volatility(&self, snapshot: &MarketSnapshot, setup: SetupType) -> f64 {
        let cfg = &self.config;
        let (primary, secondary) = setup.stop_timeframes();
        let atr_p = snapshot.timeframes.get(primary).atr;
        let atr_s = snapshot.timeframes.get(secondary).atr;
        let blended =
            cfg.primary_volatility_weight * atr_p + (1.0 - cfg.primary_volatility_weight) * atr_s;
        if blended > 0.0 {
            blended
        } else {
            snapshot.current_price * 0.001
        }
    }

    /// Unscaled stop distance and its kind
    fn base_distance(&self, snapshot: &MarketSnapshot, eff_vol: f64) -> (f64, StopKind) {
        let cfg = &self.config;
        let price = snapshot.current_price;
        let direction = snapshot.direction();

        let level = match snapshot.position.side {
            Side::Long => snapshot.structure.nearest_support,
            Side::Short => snapshot.structure.nearest_resistance,
        };
        if level > 0.0 && (price - level) * direction > 0.0 {
            let distance = (price - level).abs();
            if distance <= cfg.max_structure_distance_atr * eff_vol {
                return (
                    distance + cfg.structure_buffer_atr * eff_vol,
                    StopKind::Structure,
                );
            }
        }
        (cfg.atr_stop_multiple * eff_vol, StopKind::Volatility)
    }

    fn trail_threshold(&self, setup: SetupType) -> f64 {
        match setup {
            SetupType::Scalp => self.config.trail_threshold_scalp,
            SetupType::Day => self.config.trail_threshold_day,
            SetupType::Swing => self.config.trail_threshold_swing,
        }
    }

    fn trail_lock(&self, setup: SetupType) -> f64 {
        match setup {
            SetupType::Scalp => self.config.trail_lock_scalp,
            SetupType::Day => self.config.trail_lock_day,
            SetupType::Swing => self.config.trail_lock_swing,
        }
    }

    /// A tighter stop is always worth proposing. A wider one only when the
    /// thesis has earned the room and the result stays inside the sanity
    /// band; wider is not automatically safer.
    fn should_modify(
        &self,
        snapshot: &MarketSnapshot,
        probs: &ProbabilityEstimate,
        stop: f64,
        price: f64,
        direction: f64,
        eff_vol: f64,
    ) -> bool {
        let cfg = &self.config;
        let existing = snapshot.position.stop_loss;
        if existing <= 0.0 {
            return true;
        }
        let tightens = (stop - existing) * direction > 0.0;
        if tightens {
            return true;
        }
        if (stop - existing).abs() < f64::EPSILON {
            return false;
        }
        let new_distance_atr = (price - stop).abs() / eff_vol;
        probs.continuation >= cfg.widen_continuation_floor
            && new_distance_atr <= cfg.widen_beyond_atr
    }
}

impl Default for DynamicStopCalculator {
    fn default() -> Self {
        Self::new()
    }
}
