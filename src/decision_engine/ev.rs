//! 🧮 Expected Value Calculator
//!
//! Prices every candidate action in % of account equity. HOLD is the
//! reference composition over the continuation / reversal / flat outcomes,
//! charged with the risk premiums and the over-holding penalties; the exits
//! realize profit and collect those premiums instead; the adds are HOLD
//! modified by entry quality, price confirmation and position concentration,
//! hard-gated whenever adding cannot be justified.

use log::debug;

use crate::config::EvConfig;
use crate::decision_engine::premiums::PremiumReport;
use crate::decision_engine::probability::ProbabilityEstimate;
use crate::snapshot::{MarketSnapshot, SetupType, Side};

/// Candidate actions, in evaluation order. HOLD comes first so it wins
/// exact EV ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hold,
    ScaleOut25,
    ScaleOut50,
    Close,
    ScaleIn,
    Dca,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Hold,
        Action::ScaleOut25,
        Action::ScaleOut50,
        Action::Close,
        Action::ScaleIn,
        Action::Dca,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Hold => "HOLD",
            Action::ScaleOut25 => "SCALE_OUT_25",
            Action::ScaleOut50 => "SCALE_OUT_50",
            Action::Close => "CLOSE",
            Action::ScaleIn => "SCALE_IN",
            Action::Dca => "DCA",
        }
    }

    /// Fraction of the position this action exits
    pub fn exit_fraction(&self) -> f64 {
        match self {
            Action::ScaleOut25 => 0.25,
            Action::ScaleOut50 => 0.50,
            Action::Close => 1.0,
            _ => 0.0,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Action::ScaleOut25 | Action::ScaleOut50 | Action::Close)
    }

    pub fn is_add(&self) -> bool {
        matches!(self, Action::ScaleIn | Action::Dca)
    }
}

/// One priced action
#[derive(Debug, Clone, Copy)]
pub struct ActionCandidate {
    pub action: Action,

    /// Expected value, % of account equity
    pub ev: f64,

    /// Fraction of the position exited if this action is taken
    pub exit_fraction: f64,
}

/// Everything the calculator reads for one evaluation
pub struct EvContext<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub probs: &'a ProbabilityEstimate,
    pub premiums: &'a PremiumReport,

    /// Move exhaustion score, 0-1
    pub exhaustion: f64,

    /// Entry/add attractiveness score, 0-1
    pub entry_score: f64,

    pub setup: SetupType,

    /// Current unrealized profit, % of account
    pub profit_pct: f64,

    /// Position notional over account equity
    pub size_ratio: f64,
}

/// All six candidates plus the geometry that produced them
#[derive(Debug, Clone)]
pub struct EvReport {
    pub candidates: Vec<ActionCandidate>,

    /// Thesis-scaled upside if the move continues, % of account
    pub potential_gain_pct: f64,

    /// Reversal-weighted downside, capped per setup type, % of account
    pub potential_loss_pct: f64,

    /// Structure/ATR-derived profit target, % of account
    pub target_pct: f64,

    /// profit / target; above 1.0 the position has outrun its target
    pub capture_ratio: f64,

    /// What closing forfeits, % of account
    pub opportunity_cost_pct: f64,
}

impl EvReport {
    pub fn ev(&self, action: Action) -> f64 {
        self.candidates
            .iter()
            .find(|c| c.action == action)
            .map(|c| c.ev)
            .unwrap_or(0.0)
    }

    /// Highest-EV candidate; exact ties go to the earlier entry, so HOLD
    /// wins a dead heat.
    pub fn best(&self) -> &ActionCandidate {
        let mut best = &self.candidates[0];
        for candidate in &self.candidates[1..] {
            if candidate.ev > best.ev {
                best = candidate;
            }
        }
        best
    }

    /// EV of the runner-up, for the confidence spread
    pub fn second_best_ev(&self) -> f64 {
        let best = self.best();
        self.candidates
            .iter()
            .filter(|c| c.action != best.action)
            .map(|c| c.ev)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn breakdown(&self) -> String {
        let evs: Vec<String> = self
            .candidates
            .iter()
            .map(|c| format!("{}={:.3}", c.action.as_str(), c.ev))
            .collect();
        format!(
            "gain={:.3} loss={:.3} target={:.3} capture={:.2} opp={:.3} | {}",
            self.potential_gain_pct,
            self.potential_loss_pct,
            self.target_pct,
            self.capture_ratio,
            self.opportunity_cost_pct,
            evs.join(" ")
        )
    }
}

/// Prices the six candidate actions for one snapshot
pub struct EvCalculator {
    config: EvConfig,
}

impl EvCalculator {
    pub fn new() -> Self {
        Self::with_config(EvConfig::default())
    }

    pub fn with_config(config: EvConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, ctx: &EvContext) -> EvReport {
        let cfg = &self.config;
        let probs = ctx.probs;

        let (target_pct, gain_pct) = self.potential_gain(ctx);
        let capture_ratio = if target_pct > 0.0 {
            ctx.profit_pct / target_pct
        } else {
            0.0
        };

        let continuation_floor = probs.continuation.max(cfg.continuation_floor);
        let loss_pct =
            (gain_pct * probs.reversal / continuation_floor).min(ctx.setup.loss_cap_pct());
        let cost_pct = ctx.snapshot.trading_cost_pct();

        // Leading indicator: HTF volume divergence warns before price does
        let divergence = ctx.snapshot.volume.volume_divergence.clamp(0.0, 1.0);
        let divergence_penalty = if divergence > cfg.divergence_penalty_threshold {
            cfg.divergence_penalty_weight * (divergence - cfg.divergence_penalty_threshold)
                / (1.0 - cfg.divergence_penalty_threshold)
        } else {
            0.0
        };

        // Holding past the target is a bet the market no longer offers
        let target_penalty = if capture_ratio > 1.0 {
            cfg.target_excess_penalty_scale * (capture_ratio - 1.0).min(3.0) * probs.reversal
        } else {
            0.0
        };

        let ev_hold = probs.continuation * gain_pct
            + probs.reversal * (ctx.profit_pct - loss_pct)
            + probs.flat * ctx.profit_pct
            - ctx.premiums.total
            - divergence_penalty
            - target_penalty;

        let opportunity_cost = self.opportunity_cost(ctx, gain_pct);
        let ev_close = self.ev_close(ctx, gain_pct, capture_ratio, opportunity_cost, cost_pct);
        let ev_so25 = self.ev_scale_out(ctx, 0.25, ev_hold, cost_pct, target_penalty);
        let ev_so50 = self.ev_scale_out(ctx, 0.50, ev_hold, cost_pct, target_penalty);
        let ev_scale_in = self.ev_add(ctx, Action::ScaleIn, ev_hold);
        let ev_dca = self.ev_add(ctx, Action::Dca, ev_hold);

        let candidates = vec![
            candidate(Action::Hold, ev_hold),
            candidate(Action::ScaleOut25, ev_so25),
            candidate(Action::ScaleOut50, ev_so50),
            candidate(Action::Close, ev_close),
            candidate(Action::ScaleIn, ev_scale_in),
            candidate(Action::Dca, ev_dca),
        ];

        let report = EvReport {
            candidates,
            potential_gain_pct: gain_pct,
            potential_loss_pct: loss_pct,
            target_pct,
            capture_ratio,
            opportunity_cost_pct: opportunity_cost,
        };
        debug!("{} ev: {}", ctx.snapshot.symbol, report.breakdown());
        report
    }

    /// Upside from the next structural level in the profit direction, with
    /// a setup-scaled ATR multiple when no usable structure exists. Returned
    /// as (raw target, thesis-scaled gain), both capped at the sanity
    /// ceiling and in % of account.
    fn potential_gain(&self, ctx: &EvContext) -> (f64, f64) {
        let cfg = &self.config;
        let distance = self.target_distance(ctx.snapshot, ctx.setup);
        let raw = ctx.snapshot.price_move_to_account_pct(distance).max(0.0);
        let target = raw.min(cfg.gain_sanity_cap_pct);
        let scaled = (raw
            * (cfg.gain_thesis_base + cfg.gain_thesis_span * ctx.probs.thesis_quality))
            .min(cfg.gain_sanity_cap_pct);
        (target, scaled)
    }

    /// Price distance to the profit target
    fn target_distance(&self, snapshot: &MarketSnapshot, setup: SetupType) -> f64 {
        let (primary, _) = setup.stop_timeframes();
        let atr = snapshot.timeframes.get(primary).atr;
        let ref_atr = if atr > 0.0 {
            atr
        } else {
            snapshot.current_price * 0.001
        };

        let level = match snapshot.position.side {
            Side::Long => snapshot.structure.nearest_resistance,
            Side::Short => snapshot.structure.nearest_support,
        };
        if level > 0.0 && (level - snapshot.current_price) * snapshot.direction() > 0.0 {
            let distance = (level - snapshot.current_price).abs();
            if distance <= self.config.max_structure_distance_atr * ref_atr {
                return distance;
            }
        }
        setup.atr_target_multiple() * ref_atr
    }

    /// What closing forfeits: the continuation-weighted upside, discounted
    /// when the engine's own signals say that upside is illusory.
    fn opportunity_cost(&self, ctx: &EvContext, gain_pct: f64) -> f64 {
        let cfg = &self.config;
        let probs = ctx.probs;
        let mut opportunity = gain_pct * probs.continuation * probs.thesis_quality;
        if probs.reversal > probs.continuation {
            opportunity *= cfg.opportunity_reversal_factor;
        }
        if ctx.exhaustion > cfg.opportunity_exhaustion_threshold {
            opportunity *= cfg.opportunity_exhaustion_factor;
        }
        if ctx.snapshot.ml_disagreement() > cfg.opportunity_ml_threshold {
            opportunity *= cfg.opportunity_ml_factor;
        }
        opportunity
    }

    fn ev_close(
        &self,
        ctx: &EvContext,
        gain_pct: f64,
        capture_ratio: f64,
        opportunity_cost: f64,
        cost_pct: f64,
    ) -> f64 {
        let cfg = &self.config;

        // Cashing in a sliver of the target while the thesis still works is
        // how a system churns itself to death
        let premature_penalty = if ctx.profit_pct > 0.0
            && capture_ratio < cfg.premature_capture_threshold
            && ctx.probs.thesis_quality >= cfg.premature_thesis_floor
        {
            cfg.premature_penalty_scale
                * (cfg.premature_capture_threshold - capture_ratio)
                / cfg.premature_capture_threshold
                * gain_pct
        } else {
            0.0
        };

        ctx.profit_pct - cost_pct - opportunity_cost - premature_penalty + ctx.premiums.total
    }

    fn ev_scale_out(
        &self,
        ctx: &EvContext,
        fraction: f64,
        ev_hold: f64,
        cost_pct: f64,
        target_penalty: f64,
    ) -> f64 {
        let cfg = &self.config;
        let exhaustion_bonus = cfg.scale_out_exhaustion_bonus * ctx.exhaustion * fraction;
        fraction * (ctx.profit_pct - cost_pct)
            + (1.0 - fraction) * ev_hold
            + fraction * ctx.premiums.total
            + fraction * target_penalty
            + exhaustion_bonus
    }

    /// SCALE_IN adds to a winner, DCA adds to a loser. Both are HOLD with
    /// multipliers, and both land strictly below HOLD when any hard gate
    /// fires.
    fn ev_add(&self, ctx: &EvContext, action: Action, ev_hold: f64) -> f64 {
        let cfg = &self.config;
        let gated = ev_hold - cfg.add_gate_margin_pct;

        if ctx.probs.thesis_quality < cfg.add_thesis_floor {
            return gated;
        }
        if ctx.size_ratio >= cfg.max_size_ratio {
            return gated;
        }
        if ctx.snapshot.is_friday_afternoon() {
            return gated;
        }
        if ev_hold <= 0.0 {
            return gated;
        }
        match action {
            Action::ScaleIn if ctx.profit_pct < 0.0 => return gated,
            Action::Dca if ctx.profit_pct >= 0.0 => return gated,
            _ => {}
        }

        let modifier = cfg.entry_modifier_scale * (2.0 * ctx.entry_score - 1.0);
        // Short-term price confirmation from M30 momentum
        let favorable_m30 = ctx.snapshot.timeframes.m30.momentum * ctx.snapshot.direction();
        let confirmation = (1.0 + 0.2 * favorable_m30).clamp(0.8, 1.2);
        let marginal_utility = (1.0 - ctx.size_ratio / cfg.max_size_ratio).clamp(0.0, 1.0);

        let mut ev = ev_hold * (1.0 + modifier) * confirmation * marginal_utility;
        if action == Action::Dca {
            ev *= cfg.dca_confirmation_discount;
        }
        ev
    }
}

impl Default for EvCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn candidate(action: Action, ev: f64) -> ActionCandidate {
    ActionCandidate {
        action,
        ev,
        exit_fraction: action.exit_fraction(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{MlDirection, MlPrediction, Side};

    fn snapshot(profit_pips: f64) -> MarketSnapshot {
        let mut snap = MarketSnapshot::default();
        snap.symbol = "EURUSD".to_string();
        snap.position.side = Side::Long;
        snap.position.volume = 1.0;
        snap.position.entry_price = 1.0950;
        snap.position.age_minutes = 300.0;
        snap.current_price = 1.0950 + profit_pips * 0.0001;
        snap.account.balance = 100_000.0;
        snap.timestamp = 1_750_100_000; // a Monday evening
        for ind in [
            &mut snap.timeframes.m15,
            &mut snap.timeframes.m30,
            &mut snap.timeframes.h1,
            &mut snap.timeframes.h4,
            &mut snap.timeframes.d1,
        ] {
            ind.trend = 0.7;
            ind.momentum = 0.3;
            ind.atr = 0.0010;
        }
        snap
    }

    fn probs(continuation: f64, reversal: f64, thesis: f64) -> ProbabilityEstimate {
        ProbabilityEstimate {
            continuation,
            reversal,
            flat: (1.0 - continuation - reversal).max(0.0),
            thesis_quality: thesis,
            ml_factor: thesis,
            htf_support: thesis,
        }
    }

    fn premiums(total: f64) -> PremiumReport {
        PremiumReport {
            parts: vec![],
            subtotal: total,
            multiplier: 1.0,
            total,
        }
    }

    fn context<'a>(
        snap: &'a MarketSnapshot,
        probs: &'a ProbabilityEstimate,
        premiums: &'a PremiumReport,
    ) -> EvContext<'a> {
        EvContext {
            snapshot: snap,
            probs,
            premiums,
            exhaustion: 0.2,
            entry_score: 0.5,
            setup: SetupType::Day,
            profit_pct: snap.profit_pct(),
            size_ratio: snap.size_ratio(),
        }
    }

    #[test]
    fn test_six_candidates_hold_first() {
        let calc = EvCalculator::new();
        let snap = snapshot(20.0);
        let p = probs(0.6, 0.2, 0.6);
        let prem = premiums(0.0);
        let report = calc.evaluate(&context(&snap, &p, &prem));
        assert_eq!(report.candidates.len(), 6);
        assert_eq!(report.candidates[0].action, Action::Hold);
        assert_eq!(report.ev(Action::Close), report.candidates[3].ev);
        assert!((report.candidates[2].exit_fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hold_positive_in_healthy_trend() {
        let calc = EvCalculator::new();
        let snap = snapshot(20.0); // 0.2% in, capture well under 1
        let p = probs(0.7, 0.15, 0.75);
        let prem = premiums(0.01);
        let report = calc.evaluate(&context(&snap, &p, &prem));
        assert!(report.ev(Action::Hold) > 0.0);
        assert!(report.capture_ratio < 1.0);
    }

    #[test]
    fn test_premature_close_loses_to_hold() {
        let calc = EvCalculator::new();
        // 5 pips in on a 25-pip ATR target: capture 0.2, thesis strong
        let snap = snapshot(5.0);
        let p = probs(0.65, 0.20, 0.8);
        let prem = premiums(0.0);
        let report = calc.evaluate(&context(&snap, &p, &prem));
        assert!(report.capture_ratio < 0.3, "capture {}", report.capture_ratio);
        assert!(report.ev(Action::Close) < report.ev(Action::Hold));
    }

    #[test]
    fn test_target_exceeded_with_reversal_favors_exit() {
        let calc = EvCalculator::new();
        // 80 pips in on a 25-pip target, model leaning reversal
        let mut snap = snapshot(80.0);
        snap.ml = MlPrediction {
            direction: MlDirection::Sell,
            confidence: 80.0,
        };
        snap.volume.volume_divergence = 0.6;
        let p = probs(0.30, 0.55, 0.3);
        let prem = premiums(0.3);
        let mut ctx = context(&snap, &p, &prem);
        ctx.exhaustion = 0.7;
        let report = calc.evaluate(&ctx);

        assert!(report.capture_ratio > 1.5, "capture {}", report.capture_ratio);
        assert!(report.ev(Action::Close) > report.ev(Action::Hold));
        assert!(report.ev(Action::ScaleOut50) > report.ev(Action::Hold));
    }

    #[test]
    fn test_loss_capped_by_setup_type() {
        let calc = EvCalculator::new();
        let snap = snapshot(10.0);
        let p = probs(0.15, 0.90, 0.5);
        let prem = premiums(0.0);

        let day = calc.evaluate(&context(&snap, &p, &prem));
        assert!(day.potential_loss_pct <= SetupType::Day.loss_cap_pct() + 1e-9);

        let mut ctx = context(&snap, &p, &prem);
        ctx.setup = SetupType::Scalp;
        let scalp = calc.evaluate(&ctx);
        assert!(
            (scalp.potential_loss_pct - SetupType::Scalp.loss_cap_pct()).abs() < 1e-9,
            "loss {}",
            scalp.potential_loss_pct
        );
    }

    #[test]
    fn test_gain_capped_by_sanity_ceiling() {
        let calc = EvCalculator::new();
        let mut snap = snapshot(10.0);
        snap.position.volume = 50.0; // grotesque notional
        let p = probs(0.6, 0.2, 0.9);
        let prem = premiums(0.0);
        let report = calc.evaluate(&context(&snap, &p, &prem));
        assert!(report.potential_gain_pct <= 10.0 + 1e-9);
        assert!((report.target_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_structure_target_preferred_over_atr() {
        let calc = EvCalculator::new();
        let mut snap = snapshot(10.0);
        // Resistance 15 pips overhead, inside the 4-ATR window
        snap.structure.nearest_resistance = snap.current_price + 0.0015;
        let p = probs(0.6, 0.2, 0.6);
        let prem = premiums(0.0);
        let near = calc.evaluate(&context(&snap, &p, &prem));

        // 0.0015 on 1 lot of 100k over 100k = 0.15%
        assert!((near.target_pct - 0.15).abs() < 1e-9, "target {}", near.target_pct);

        // Structure miles away falls back to the ATR multiple (0.25%)
        snap.structure.nearest_resistance = snap.current_price + 0.0100;
        let far = calc.evaluate(&context(&snap, &p, &prem));
        assert!((far.target_pct - 0.25).abs() < 1e-9, "target {}", far.target_pct);
    }

    #[test]
    fn test_adds_hard_gated() {
        let calc = EvCalculator::new();
        let cfg = EvConfig::default();
        let prem = premiums(0.0);

        // Weak thesis
        let snap = snapshot(20.0);
        let weak = probs(0.6, 0.2, 0.3);
        let report = calc.evaluate(&context(&snap, &weak, &prem));
        let hold = report.ev(Action::Hold);
        assert!((report.ev(Action::ScaleIn) - (hold - cfg.add_gate_margin_pct)).abs() < 1e-9);
        assert!(report.ev(Action::ScaleIn) < hold);

        // Friday afternoon
        let mut friday = snapshot(20.0);
        friday.timestamp = 1_767_369_600; // Friday 16:00 UTC
        let strong = probs(0.7, 0.15, 0.8);
        let report = calc.evaluate(&context(&friday, &strong, &prem));
        assert!(report.ev(Action::ScaleIn) < report.ev(Action::Hold));
        assert!(report.ev(Action::Dca) < report.ev(Action::Hold));

        // At the size ceiling
        let snap = snapshot(20.0);
        let mut ctx = context(&snap, &strong, &prem);
        ctx.size_ratio = 12.0;
        let report = calc.evaluate(&ctx);
        assert!(report.ev(Action::ScaleIn) < report.ev(Action::Hold));
    }

    #[test]
    fn test_scale_in_rewards_strong_entry() {
        let calc = EvCalculator::new();
        let snap = snapshot(20.0);
        let p = probs(0.7, 0.15, 0.8);
        let prem = premiums(0.0);
        let mut ctx = context(&snap, &p, &prem);
        ctx.entry_score = 0.95;
        let report = calc.evaluate(&ctx);
        assert!(report.ev(Action::ScaleIn) > report.ev(Action::Hold));

        // Same setup with a hostile entry score inverts the relation
        ctx.entry_score = 0.15;
        let report = calc.evaluate(&ctx);
        assert!(report.ev(Action::ScaleIn) < report.ev(Action::Hold));
    }

    #[test]
    fn test_dca_only_for_losing_positions() {
        let calc = EvCalculator::new();
        let cfg = EvConfig::default();
        let prem = premiums(0.0);

        // In profit: DCA is gated
        let winner = snapshot(20.0);
        let p = probs(0.7, 0.15, 0.7);
        let report = calc.evaluate(&context(&winner, &p, &prem));
        let hold = report.ev(Action::Hold);
        assert!((report.ev(Action::Dca) - (hold - cfg.add_gate_margin_pct)).abs() < 1e-9);

        // Underwater with a live thesis: DCA prices normally
        let loser = snapshot(-20.0);
        let report = calc.evaluate(&context(&loser, &p, &prem));
        let hold = report.ev(Action::Hold);
        assert!(hold > 0.0, "hold {}", hold);
        assert!(report.ev(Action::Dca) > hold - cfg.add_gate_margin_pct);
    }

    #[test]
    fn test_premiums_shift_hold_down_and_close_up() {
        let calc = EvCalculator::new();
        let snap = snapshot(30.0);
        let p = probs(0.5, 0.3, 0.5);

        let light = premiums(0.0);
        let heavy = premiums(0.5);
        let base = calc.evaluate(&context(&snap, &p, &light));
        let charged = calc.evaluate(&context(&snap, &p, &heavy));

        assert!(charged.ev(Action::Hold) < base.ev(Action::Hold));
        assert!(charged.ev(Action::Close) > base.ev(Action::Close));
    }

    #[test]
    fn test_best_and_second_best() {
        let calc = EvCalculator::new();
        let snap = snapshot(20.0);
        let p = probs(0.7, 0.15, 0.75);
        let prem = premiums(0.0);
        let report = calc.evaluate(&context(&snap, &p, &prem));
        let best = report.best();
        assert!(best.ev >= report.second_best_ev());
        assert!(report
            .candidates
            .iter()
            .all(|c| c.ev <= best.ev + 1e-12));
    }
}
