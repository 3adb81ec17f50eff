//! Engine calibration
//!
//! One config struct per component, aggregated into [`EngineConfig`].
//! Every threshold that was tuned ad hoc in the original heuristics is a
//! named field here so hosts can recalibrate without recompiling the math.

/// Probability model calibration
#[derive(Debug, Clone)]
pub struct ProbabilityConfig {
    /// HTF support above this counts a timeframe as strongly aligned (default: 0.65)
    pub strong_support_threshold: f64,

    /// ML blend weight when >= 3 HTFs strongly aligned: trust structure (default: 0.25)
    pub ml_weight_structure_strong: f64,

    /// ML blend weight when exactly 2 HTFs aligned (default: 0.40)
    pub ml_weight_neutral: f64,

    /// ML blend weight when <= 1 HTF aligned: trust the model (default: 0.60)
    pub ml_weight_structure_weak: f64,

    /// ml_factor used when the model says HOLD (default: 0.6)
    pub ml_neutral_factor: f64,

    /// HTF weighting for D1 / H4 / H1 (defaults: 0.40 / 0.35 / 0.25)
    pub htf_weight_d1: f64,
    pub htf_weight_h4: f64,
    pub htf_weight_h1: f64,

    /// Weight of the multi-timeframe momentum term (default: 0.12)
    pub momentum_weight: f64,

    /// Weight of the RSI exhaustion term (default: 0.10)
    pub rsi_weight: f64,

    /// Weight of the market-structure bonus/penalty (default: 0.08)
    pub structure_weight: f64,

    /// Weight of the volume-divergence penalty (default: 0.12)
    pub divergence_weight: f64,

    /// Fraction of the raw opposition that converts to reversal mass; the
    /// rest stays flat (default: 0.8)
    pub reversal_damping: f64,

    /// Floor and ceiling for each probability (defaults: 0.05 / 0.90)
    pub min_probability: f64,
    pub max_probability: f64,

    /// continuation + reversal are rescaled above this sum (default: 0.95)
    pub max_combined: f64,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            strong_support_threshold: 0.65,
            ml_weight_structure_strong: 0.25,
            ml_weight_neutral: 0.40,
            ml_weight_structure_weak: 0.60,
            ml_neutral_factor: 0.6,
            htf_weight_d1: 0.40,
            htf_weight_h4: 0.35,
            htf_weight_h1: 0.25,
            momentum_weight: 0.12,
            rsi_weight: 0.10,
            structure_weight: 0.08,
            divergence_weight: 0.12,
            reversal_damping: 0.8,
            min_probability: 0.05,
            max_probability: 0.90,
            max_combined: 0.95,
        }
    }
}

/// Exit / entry / exhaustion scoring calibration
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Per-timeframe scan weights, M15 -> D1
    /// (defaults: 0.10 / 0.15 / 0.20 / 0.25 / 0.30)
    pub weight_m15: f64,
    pub weight_m30: f64,
    pub weight_h1: f64,
    pub weight_h4: f64,
    pub weight_d1: f64,

    /// Weight of confidence-scaled ML opposition (default: 0.5)
    pub ml_opposition_weight: f64,

    /// Alignment below this adds exit pressure (default: 0.5)
    pub weak_alignment_threshold: f64,

    /// Weight of weak cross-timeframe alignment in the exit score (default: 0.3)
    pub alignment_weight: f64,

    /// Weight of an adverse structure break in the exit score (default: 0.3)
    pub structure_exit_weight: f64,

    /// Weight of HTF volume divergence in the exit score (default: 0.4)
    pub divergence_exit_weight: f64,

    /// Weight of profit giveback in the exit score (default: 0.6)
    pub giveback_exit_weight: f64,

    /// Volume divergence above this soft threshold damps the entry score (default: 0.4)
    pub entry_divergence_threshold: f64,

    /// Multiplier applied to the entry score past the threshold (default: 0.4)
    pub entry_divergence_damping: f64,

    /// Exhaustion term weights
    pub exhaustion_momentum_weight: f64,
    pub exhaustion_macd_weight: f64,
    pub exhaustion_rsi_weight: f64,
    pub exhaustion_volume_weight: f64,
    pub exhaustion_structure_weight: f64,
    pub exhaustion_adx_weight: f64,
    pub exhaustion_regime_weight: f64,

    /// RSI extreme bands (defaults: 70 / 30)
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,

    /// ADX below this reads as trend fatigue (default: 20)
    pub adx_floor: f64,

    /// Normalization guard (default: 1e-6)
    pub epsilon: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_m15: 0.10,
            weight_m30: 0.15,
            weight_h1: 0.20,
            weight_h4: 0.25,
            weight_d1: 0.30,
            ml_opposition_weight: 0.5,
            weak_alignment_threshold: 0.5,
            alignment_weight: 0.3,
            structure_exit_weight: 0.3,
            divergence_exit_weight: 0.4,
            giveback_exit_weight: 0.6,
            entry_divergence_threshold: 0.4,
            entry_divergence_damping: 0.4,
            exhaustion_momentum_weight: 0.22,
            exhaustion_macd_weight: 0.13,
            exhaustion_rsi_weight: 0.20,
            exhaustion_volume_weight: 0.15,
            exhaustion_structure_weight: 0.15,
            exhaustion_adx_weight: 0.10,
            exhaustion_regime_weight: 0.05,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            adx_floor: 20.0,
            epsilon: 1e-6,
        }
    }
}

/// Risk premium calibration
#[derive(Debug, Clone)]
pub struct PremiumConfig {
    /// Protection urgency blend weights (defaults: 0.35 / 0.25 / 0.25 / 0.15)
    pub urgency_exhaustion_weight: f64,
    pub urgency_ml_weight: f64,
    pub urgency_htf_weight: f64,
    pub urgency_divergence_weight: f64,

    /// Peak giveback: base allowed fraction of the peak (default: 0.40)
    pub giveback_base_allowance: f64,

    /// Extra allowance granted per unit of thesis quality (default: 0.25)
    pub giveback_thesis_bonus: f64,

    /// Allowance removed per unit of normalized position size (default: 0.20)
    pub giveback_size_tightening: f64,

    /// Hard bounds on the allowance (defaults: 0.15 / 0.75)
    pub giveback_min_allowance: f64,
    pub giveback_max_allowance: f64,

    /// Premium per unit of excess giveback x peak profit (default: 0.8)
    pub giveback_scale: f64,

    /// Size ratio that counts as fully oversized when tightening the
    /// giveback allowance (default: 6.0)
    pub giveback_size_norm_ratio: f64,

    /// Drawdown premium weight (default: 0.6)
    pub drawdown_weight: f64,

    /// Age amplifier exponent for overdue positions (default: 1.5)
    pub drawdown_age_exponent: f64,

    /// Age amplifier ceiling (default: 3.0)
    pub drawdown_age_cap: f64,

    /// Regime misalignment premium weight (default: 0.3)
    pub regime_weight: f64,

    /// News risk ramps inside this many minutes (default: 60)
    pub news_window_minutes: f64,

    /// News premium at event time (default: 0.4)
    pub news_weight: f64,

    /// Friday-afternoon weekend premium at full ramp (default: 0.3)
    pub weekend_weight: f64,

    /// High thesis quality scales news/weekend premiums down by up to this (default: 0.5)
    pub thesis_relief: f64,

    /// Adverse order-flow premium weight (default: 0.2)
    pub order_flow_weight: f64,

    /// Position age decay premium weight (default: 0.25)
    pub age_decay_weight: f64,

    /// Overdue ratio cap for the age premium (default: 2.0)
    pub age_decay_cap: f64,

    /// ATR as % of price below which the regime is calm (default: 0.06)
    pub vol_low_atr_pct: f64,

    /// ATR as % of price above which the regime is stressed (default: 0.25)
    pub vol_high_atr_pct: f64,

    /// Premium multiplier in calm / stressed regimes (defaults: 0.85 / 1.30)
    pub vol_multiplier_low: f64,
    pub vol_multiplier_high: f64,
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            urgency_exhaustion_weight: 0.35,
            urgency_ml_weight: 0.25,
            urgency_htf_weight: 0.25,
            urgency_divergence_weight: 0.15,
            giveback_base_allowance: 0.40,
            giveback_thesis_bonus: 0.25,
            giveback_size_tightening: 0.20,
            giveback_min_allowance: 0.15,
            giveback_max_allowance: 0.75,
            giveback_scale: 0.8,
            giveback_size_norm_ratio: 6.0,
            drawdown_weight: 0.6,
            drawdown_age_exponent: 1.5,
            drawdown_age_cap: 3.0,
            regime_weight: 0.3,
            news_window_minutes: 60.0,
            news_weight: 0.4,
            weekend_weight: 0.3,
            thesis_relief: 0.5,
            order_flow_weight: 0.2,
            age_decay_weight: 0.25,
            age_decay_cap: 2.0,
            vol_low_atr_pct: 0.06,
            vol_high_atr_pct: 0.25,
            vol_multiplier_low: 0.85,
            vol_multiplier_high: 1.30,
        }
    }
}

/// EV composition calibration
#[derive(Debug, Clone)]
pub struct EvConfig {
    /// Sanity ceiling on potential gain, % of account (default: 10.0)
    pub gain_sanity_cap_pct: f64,

    /// Gain is scaled by (base + span * thesis_quality) (defaults: 0.5 / 0.5)
    pub gain_thesis_base: f64,
    pub gain_thesis_span: f64,

    /// Continuation floor used in the loss-ratio division guard (default: 0.15)
    pub continuation_floor: f64,

    /// Ignore structure levels farther than this many ATRs (default: 4.0)
    pub max_structure_distance_atr: f64,

    /// Volume divergence above this triggers the leading-indicator penalty (default: 0.3)
    pub divergence_penalty_threshold: f64,

    /// Leading-indicator penalty weight (default: 0.3)
    pub divergence_penalty_weight: f64,

    /// Target-exceeded penalty per unit of excess ratio x reversal (default: 0.5)
    pub target_excess_penalty_scale: f64,

    /// Opportunity cost reduction when reversal > continuation (default: 0.5)
    pub opportunity_reversal_factor: f64,

    /// Exhaustion above this halves the opportunity cost (defaults: 0.6 / 0.5)
    pub opportunity_exhaustion_threshold: f64,
    pub opportunity_exhaustion_factor: f64,

    /// ML disagreement above this reduces the opportunity cost (defaults: 0.5 / 0.6)
    pub opportunity_ml_threshold: f64,
    pub opportunity_ml_factor: f64,

    /// Premature exit penalty applies below this capture ratio (default: 0.30)
    pub premature_capture_threshold: f64,

    /// Premature exit penalty scale (default: 0.6)
    pub premature_penalty_scale: f64,

    /// Thesis quality needed for the premature penalty to apply (default: 0.5)
    pub premature_thesis_floor: f64,

    /// Exhaustion bonus granted to partial exits (default: 0.3)
    pub scale_out_exhaustion_bonus: f64,

    /// Entry score modifier span for SCALE_IN/DCA (default: 0.6)
    pub entry_modifier_scale: f64,

    /// SCALE_IN/DCA are hard-gated below this thesis quality (default: 0.4)
    pub add_thesis_floor: f64,

    /// Notional/equity ratio treated as the position size ceiling (default: 10.0)
    pub max_size_ratio: f64,

    /// Gated adds land this far below EV(HOLD), % of account (default: 0.05)
    pub add_gate_margin_pct: f64,

    /// Price confirmation discount applied to DCA (default: 0.85)
    pub dca_confirmation_discount: f64,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            gain_sanity_cap_pct: 10.0,
            gain_thesis_base: 0.5,
            gain_thesis_span: 0.5,
            continuation_floor: 0.15,
            max_structure_distance_atr: 4.0,
            divergence_penalty_threshold: 0.3,
            divergence_penalty_weight: 0.3,
            target_excess_penalty_scale: 0.5,
            opportunity_reversal_factor: 0.5,
            opportunity_exhaustion_threshold: 0.6,
            opportunity_exhaustion_factor: 0.5,
            opportunity_ml_threshold: 0.5,
            opportunity_ml_factor: 0.6,
            premature_capture_threshold: 0.30,
            premature_penalty_scale: 0.6,
            premature_thesis_floor: 0.5,
            scale_out_exhaustion_bonus: 0.3,
            entry_modifier_scale: 0.6,
            add_thesis_floor: 0.4,
            max_size_ratio: 10.0,
            add_gate_margin_pct: 0.05,
            dca_confirmation_discount: 0.85,
        }
    }
}

/// Decision selection calibration
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Base advantage an exit must hold over HOLD, % of account (default: 0.15)
    pub base_required_advantage_pct: f64,

    /// Advantage added per unit of model uncertainty 1-|c-r| (default: 0.20)
    pub uncertainty_scale: f64,

    /// Advantage added per unit of thesis quality (default: 0.15)
    pub thesis_scale: f64,

    /// CLOSE downgrades to SCALE_OUT_50 above this EV ratio (default: 0.90)
    pub close_softening_ratio: f64,

    /// Loss deeper than this (% of account) counts as a deep loss (default: 0.30)
    pub deep_loss_pct: f64,

    /// Reversal needed alongside a deep loss + HTF opposition (default: 0.50)
    pub reversal_gate_deep: f64,

    /// Reversal that justifies a negative-EV exit on its own (default: 0.60)
    pub reversal_gate_solo: f64,

    /// HTF opposition counted as "against the position" (default: 0.55)
    pub htf_opposition_gate: f64,

    // Override conditions that waive the advantage gate
    /// Target capture ratio (default: 1.5 = 150%)
    pub override_target_ratio: f64,
    /// Weak thesis bound (default: 0.35)
    pub override_weak_thesis: f64,
    /// Overdue age ratio (default: 1.5)
    pub override_overdue_ratio: f64,
    /// ML disagreement for the overdue override (default: 0.5)
    pub override_ml_disagreement: f64,
    /// Size ratio counted as oversized (default: 6.0)
    pub override_oversized_ratio: f64,

    /// Decision confidence = base + spread x (best - second), capped
    /// (defaults: 60 / 2.0 / 95)
    pub confidence_base: f64,
    pub confidence_spread: f64,
    pub confidence_cap: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            base_required_advantage_pct: 0.15,
            uncertainty_scale: 0.20,
            thesis_scale: 0.15,
            close_softening_ratio: 0.90,
            deep_loss_pct: 0.30,
            reversal_gate_deep: 0.50,
            reversal_gate_solo: 0.60,
            htf_opposition_gate: 0.55,
            override_target_ratio: 1.5,
            override_weak_thesis: 0.35,
            override_overdue_ratio: 1.5,
            override_ml_disagreement: 0.5,
            override_oversized_ratio: 6.0,
            confidence_base: 60.0,
            confidence_spread: 2.0,
            confidence_cap: 95.0,
        }
    }
}

/// Dynamic stop calibration
#[derive(Debug, Clone)]
pub struct StopConfig {
    /// ATR multiple for the volatility stop (default: 2.0)
    pub atr_stop_multiple: f64,

    /// Buffer placed beyond the structure level, in ATR (default: 0.5)
    pub structure_buffer_atr: f64,

    /// Structure farther than this many ATRs is ignored (default: 4.0)
    pub max_structure_distance_atr: f64,

    /// Primary/secondary blend for effective volatility (default: 0.6)
    pub primary_volatility_weight: f64,

    /// Distance shrink per unit of reversal probability (default: 0.30)
    pub reversal_tighten: f64,

    /// Distance growth per unit of continuation probability (default: 0.20)
    pub continuation_widen: f64,

    /// Distance shrink per unit of the exit attractiveness score (default: 0.15)
    pub exit_score_tighten: f64,

    /// Bounds on the distance scaling factor (defaults: 0.6 / 1.4)
    pub scale_factor_min: f64,
    pub scale_factor_max: f64,

    /// Trailing activation score weights
    /// (defaults: 0.30 / 0.20 / 0.20 / 0.15 / 0.15)
    pub trail_reversal_weight: f64,
    pub trail_weak_continuation_weight: f64,
    pub trail_divergence_weight: f64,
    pub trail_ml_weight: f64,
    pub trail_profit_weight: f64,

    /// Activation thresholds per setup (defaults: 0.45 / 0.55 / 0.65)
    pub trail_threshold_scalp: f64,
    pub trail_threshold_day: f64,
    pub trail_threshold_swing: f64,

    /// Exhaustion lowers the activation threshold by up to this (default: 0.15)
    pub trail_exhaustion_adjust: f64,

    /// Fraction of the move locked per setup (defaults: 0.65 / 0.40 / 0.15)
    pub trail_lock_scalp: f64,
    pub trail_lock_day: f64,
    pub trail_lock_swing: f64,

    /// Extra lock per unit of score above threshold (default: 0.25)
    pub trail_lock_score_bonus: f64,

    /// Profit (% of account) that saturates the trail profit term (default: 1.0)
    pub trail_profit_norm_pct: f64,

    /// Breakeven protection score weights (defaults: 0.4 / 0.3 / 0.3)
    pub breakeven_divergence_weight: f64,
    pub breakeven_structure_weight: f64,
    pub breakeven_reversal_weight: f64,

    /// Protection score needed to arm the breakeven stop (default: 0.55)
    pub breakeven_threshold: f64,

    /// Minimum profit (% of account) before breakeven arms (default: 0.15)
    pub breakeven_min_profit_pct: f64,

    /// Breakeven buffer past entry, in ATR (default: 0.1)
    pub breakeven_buffer_atr: f64,

    /// Stop is never placed closer than this many ATRs to price (default: 0.25)
    pub min_stop_distance_atr: f64,

    /// Widening proposals are capped at this many ATRs from price (default: 3.5)
    pub widen_beyond_atr: f64,

    /// Continuation needed before the calculator proposes widening (default: 0.60)
    pub widen_continuation_floor: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            atr_stop_multiple: 2.0,
            structure_buffer_atr: 0.5,
            max_structure_distance_atr: 4.0,
            primary_volatility_weight: 0.6,
            reversal_tighten: 0.30,
            continuation_widen: 0.20,
            exit_score_tighten: 0.15,
            scale_factor_min: 0.6,
            scale_factor_max: 1.4,
            trail_reversal_weight: 0.30,
            trail_weak_continuation_weight: 0.20,
            trail_divergence_weight: 0.20,
            trail_ml_weight: 0.15,
            trail_profit_weight: 0.15,
            trail_threshold_scalp: 0.45,
            trail_threshold_day: 0.55,
            trail_threshold_swing: 0.65,
            trail_exhaustion_adjust: 0.15,
            trail_lock_scalp: 0.65,
            trail_lock_day: 0.40,
            trail_lock_swing: 0.15,
            trail_lock_score_bonus: 0.25,
            trail_profit_norm_pct: 1.0,
            breakeven_divergence_weight: 0.4,
            breakeven_structure_weight: 0.3,
            breakeven_reversal_weight: 0.3,
            breakeven_threshold: 0.55,
            breakeven_min_profit_pct: 0.15,
            breakeven_buffer_atr: 0.1,
            min_stop_distance_atr: 0.25,
            widen_beyond_atr: 3.5,
            widen_continuation_floor: 0.60,
        }
    }
}

/// Anti-churn guard calibration
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Minimum spacing between non-HOLD actions on one symbol, seconds (default: 300)
    pub min_action_spacing_secs: u64,

    /// A repeat exit needs the continuation estimate to have moved by at
    /// least this much since the last action (default: 0.05)
    pub continuation_hysteresis: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_action_spacing_secs: 300,
            continuation_hysteresis: 0.05,
        }
    }
}

/// Peak tracker calibration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Volume drop that counts as a scale-out and resets the peak (default: 0.05)
    pub volume_reset_fraction: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            volume_reset_fraction: 0.05,
        }
    }
}

/// Everything the engine needs, in one place
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub probability: ProbabilityConfig,
    pub scoring: ScoringConfig,
    pub premiums: PremiumConfig,
    pub ev: EvConfig,
    pub selector: SelectorConfig,
    pub stops: StopConfig,
    pub guard: GuardConfig,
    pub tracker: TrackerConfig,
}
