//! ⚖️ Decision Selector
//!
//! Argmax over the six priced candidates, then the gates: exits must beat
//! HOLD by a real advantage unless a documented override waives it, CLOSE
//! softens to SCALE_OUT_50 when the halves are nearly as good as the whole,
//! negative-EV exits need the reversal case to be loud, and the anti-churn
//! guard gets the last word. Stops ride along on every decision; stop
//! management never waits for an action.

use log::{debug, info};

use crate::config::SelectorConfig;
use crate::decision_engine::ev::{Action, EvReport};
use crate::decision_engine::guardrails::AntiChurnGuard;
use crate::decision_engine::probability::ProbabilityEstimate;
use crate::decision_engine::stops::{DynamicStop, StopKind};
use crate::snapshot::{MarketSnapshot, SetupType};

/// Final engine output for one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,

    /// EV of the chosen action, % of account equity
    pub ev: f64,

    /// 0-100, from the spread between the best and second-best candidate
    pub confidence: f64,

    /// Human-readable account of how the action was chosen
    pub reasoning: String,

    /// Protective stop price to apply
    pub recommended_stop: f64,

    /// Set only when the engine's scoring prefers moving the stop
    pub should_modify_stop: bool,

    pub stop_kind: StopKind,
}

/// Everything the selector reads for one evaluation
pub struct SelectorInput<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub probs: &'a ProbabilityEstimate,
    pub report: &'a EvReport,
    pub setup: SetupType,
    pub stop: &'a DynamicStop,
}

/// Picks the action and applies the exit gates
pub struct DecisionSelector {
    config: SelectorConfig,
}

impl DecisionSelector {
    pub fn new() -> Self {
        Self::with_config(SelectorConfig::default())
    }

    pub fn with_config(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn select(&self, input: &SelectorInput, guard: &AntiChurnGuard) -> Decision {
        let cfg = &self.config;
        let report = input.report;
        let probs = input.probs;
        let snapshot = input.snapshot;

        let best = report.best();
        let hold_ev = report.ev(Action::Hold);
        let mut action = best.action;
        let mut notes: Vec<String> = Vec::new();

        let override_reason = self.override_reason(input);
        if let Some(why) = override_reason {
            debug!("{} exit gate override active: {}", snapshot.symbol, why);
        }

        // 1. Exits must clear HOLD by a margin that grows with model
        //    uncertainty and with how much thesis is still standing
        if action.is_exit() {
            let advantage = best.ev - hold_ev;
            let required = cfg.base_required_advantage_pct
                + cfg.uncertainty_scale * probs.uncertainty()
                + cfg.thesis_scale * probs.thesis_quality;
            if advantage < required {
                match override_reason {
                    Some(why) => notes.push(format!("gate waived: {}", why)),
                    None => {
                        notes.push(format!(
                            "{} advantage {:.2}% below required {:.2}%",
                            action.as_str(),
                            advantage,
                            required
                        ));
                        action = Action::Hold;
                    }
                }
            }
        }

        // 2. Soften a full close when half out is almost as good
        if action == Action::Close {
            let so50 = report.ev(Action::ScaleOut50);
            if so50 >= cfg.close_softening_ratio * report.ev(Action::Close) {
                notes.push(format!(
                    "softened CLOSE to SCALE_OUT_50 ({:.2}% vs {:.2}%)",
                    so50,
                    report.ev(Action::Close)
                ));
                action = Action::ScaleOut50;
            }
        }

        // 3. Never realize a loss on a marginal model twitch
        if action.is_exit() && report.ev(action) < 0.0 {
            let profit = snapshot.profit_pct();
            let htf_against = snapshot.htf_opposition() > cfg.htf_opposition_gate;
            let deep_case = profit < -cfg.deep_loss_pct
                && probs.reversal > cfg.reversal_gate_deep
                && htf_against;
            let solo_case = probs.reversal > cfg.reversal_gate_solo;
            if !(deep_case || solo_case) {
                notes.push(format!(
                    "negative-EV {} blocked (rev {:.2}, profit {:.2}%)",
                    action.as_str(),
                    probs.reversal,
                    profit
                ));
                action = Action::Hold;
            }
        }

        // 4. Anti-churn hysteresis, unless an override earned the bypass
        if action != Action::Hold {
            let now = snapshot.timestamp.max(0) as u64;
            match guard.check_allowed(
                &snapshot.symbol,
                action,
                probs.continuation,
                now,
                override_reason.is_some(),
            ) {
                Ok(()) => guard.record_action(&snapshot.symbol, action, probs.continuation, now),
                Err(blocked) => {
                    notes.push(format!("anti-churn: {}", blocked));
                    action = Action::Hold;
                }
            }
        }

        let spread = (best.ev - report.second_best_ev()).max(0.0);
        let confidence = (cfg.confidence_base + cfg.confidence_spread * spread)
            .clamp(cfg.confidence_base, cfg.confidence_cap);

        let ev = report.ev(action);
        let mut reasoning = format!(
            "{} ev={:.2}% (hold={:.2}%) cont={:.2} rev={:.2} thesis={:.2} capture={:.2}",
            action.as_str(),
            ev,
            hold_ev,
            probs.continuation,
            probs.reversal,
            probs.thesis_quality,
            report.capture_ratio
        );
        if !notes.is_empty() {
            reasoning.push_str("; ");
            reasoning.push_str(&notes.join("; "));
        }

        info!("⚖️ {} {}", snapshot.symbol, reasoning);

        Decision {
            action,
            ev,
            confidence,
            reasoning,
            recommended_stop: input.stop.recommended_stop,
            should_modify_stop: input.stop.should_modify,
            stop_kind: input.stop.kind,
        }
    }

    /// The documented conditions that waive the exit advantage gate
    fn override_reason(&self, input: &SelectorInput) -> Option<&'static str> {
        let cfg = &self.config;
        let snapshot = input.snapshot;
        let probs = input.probs;
        let losing = snapshot.profit_pct() < 0.0;

        if input.report.capture_ratio >= cfg.override_target_ratio {
            return Some("target exceeded");
        }
        if probs.thesis_quality < cfg.override_weak_thesis && losing {
            return Some("weak thesis while losing");
        }
        let age_ratio =
            snapshot.position.age_minutes / input.setup.expected_duration_minutes();
        if age_ratio > cfg.override_overdue_ratio
            && snapshot.ml_disagreement() > cfg.override_ml_disagreement
        {
            return Some("overdue with model disagreement");
        }
        if snapshot.is_friday_afternoon() && losing {
            return Some("friday afternoon while losing");
        }
        if snapshot.size_ratio() > cfg.override_oversized_ratio && losing {
            return Some("oversized while losing");
        }
        None
    }
}

impl Default for DecisionSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_engine::ev::ActionCandidate;
    use crate::snapshot::Side;

    fn snapshot() -> MarketSnapshot {
        let mut snap = MarketSnapshot::default();
        snap.symbol = "EURUSD".to_string();
        snap.position.side = Side::Long;
        snap.position.volume = 0.1;
        snap.position.entry_price = 1.1000;
        snap.position.age_minutes = 300.0;
        snap.current_price = 1.1000; // flat, profit 0
        snap.account.balance = 100_000.0;
        snap.timestamp = 1_750_100_000; // a Monday evening
        for ind in [
            &mut snap.timeframes.h1,
            &mut snap.timeframes.h4,
            &mut snap.timeframes.d1,
        ] {
            ind.trend = 0.6;
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

    fn report(evs: [f64; 6], capture_ratio: f64) -> EvReport {
        let candidates = Action::ALL
            .iter()
            .zip(evs.iter())
            .map(|(&action, &ev)| ActionCandidate {
                action,
                ev,
                exit_fraction: action.exit_fraction(),
            })
            .collect();
        EvReport {
            candidates,
            potential_gain_pct: 0.3,
            potential_loss_pct: 0.1,
            target_pct: 0.3,
            capture_ratio,
            opportunity_cost_pct: 0.1,
        }
    }

    fn stop() -> DynamicStop {
        DynamicStop {
            recommended_stop: 1.0950,
            kind: StopKind::Volatility,
            should_modify: true,
            trail_score: 0.2,
            protection_score: 0.2,
            breakdown: String::new(),
        }
    }

    fn input<'a>(
        snap: &'a MarketSnapshot,
        p: &'a ProbabilityEstimate,
        r: &'a EvReport,
        s: &'a DynamicStop,
    ) -> SelectorInput<'a> {
        SelectorInput {
            snapshot: snap,
            probs: p,
            report: r,
            setup: SetupType::Day,
            stop: s,
        }
    }

    #[test]
    fn test_thin_exit_advantage_falls_back_to_hold() {
        let selector = DecisionSelector::new();
        let guard = AntiChurnGuard::new();
        let snap = snapshot();
        let p = probs(0.6, 0.2, 0.5);
        // CLOSE leads HOLD by only 0.10%
        let r = report([0.20, 0.15, 0.18, 0.30, 0.0, 0.0], 0.5);
        let s = stop();

        let decision = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(decision.action, Action::Hold);
        assert!(decision.reasoning.contains("below required"));
        // Stop advice rides along regardless of the action
        assert!((decision.recommended_stop - 1.0950).abs() < 1e-9);
        assert!(decision.should_modify_stop);
    }

    #[test]
    fn test_target_exceeded_waives_the_gate() {
        let selector = DecisionSelector::new();
        let guard = AntiChurnGuard::new();
        let snap = snapshot();
        let p = probs(0.6, 0.2, 0.5);
        let r = report([0.20, 0.15, 0.18, 0.30, 0.0, 0.0], 1.6);
        let s = stop();

        let decision = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(decision.action, Action::Close);
        assert!(decision.reasoning.contains("gate waived"));
    }

    #[test]
    fn test_close_softens_to_half_exit() {
        let selector = DecisionSelector::new();
        let guard = AntiChurnGuard::new();
        let snap = snapshot();
        let p = probs(0.3, 0.6, 0.2);
        let r = report([0.0, 0.5, 0.95, 1.0, -0.1, -0.1], 0.8);
        let s = stop();

        let decision = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(decision.action, Action::ScaleOut50);
        assert!((decision.ev - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_negative_ev_exit_needs_loud_reversal() {
        let selector = DecisionSelector::new();
        let snap = snapshot();
        let r = report([-0.8, -0.5, -0.4, -0.2, -0.9, -0.9], 0.5);
        let s = stop();

        // Reversal 0.45: blocked, marginal twitch
        let guard = AntiChurnGuard::new();
        let p = probs(0.25, 0.45, 0.2);
        let decision = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(decision.action, Action::Hold);
        assert!(decision.reasoning.contains("negative-EV"));

        // Reversal 0.65: the exit stands
        let guard = AntiChurnGuard::new();
        let p = probs(0.25, 0.65, 0.2);
        let decision = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(decision.action, Action::Close);
    }

    #[test]
    fn test_deep_loss_with_htf_against_allows_negative_exit() {
        let selector = DecisionSelector::new();
        let guard = AntiChurnGuard::new();
        let mut snap = snapshot();
        // 50 pips underwater on 1 lot = -0.5% of account
        snap.position.volume = 1.0;
        snap.current_price = 1.0950;
        // HTF ladder leaning against the long
        for ind in [
            &mut snap.timeframes.h1,
            &mut snap.timeframes.h4,
            &mut snap.timeframes.d1,
        ] {
            ind.trend = 0.3;
        }
        let p = probs(0.3, 0.55, 0.25);
        let r = report([-0.8, -0.5, -0.4, -0.2, -0.9, -0.9], 0.5);
        let s = stop();

        let decision = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(decision.action, Action::Close);
    }

    #[test]
    fn test_guard_spacing_downgrades_second_exit() {
        let selector = DecisionSelector::new();
        let guard = AntiChurnGuard::new();
        let p = probs(0.6, 0.3, 0.2);
        let r = report([0.0, 0.2, 0.3, 0.6, -0.1, -0.1], 0.5);
        let s = stop();

        let mut snap = snapshot();
        let first = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(first.action, Action::Close);

        // 100 seconds later the same signal fires again
        snap.timestamp += 100;
        let second = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(second.action, Action::Hold);
        assert!(second.reasoning.contains("anti-churn"));

        // Past the spacing window but the estimate has not moved: hysteresis
        snap.timestamp += 400;
        let third = selector.select(&input(&snap, &p, &r, &s), &guard);
        assert_eq!(third.action, Action::Hold);

        // Estimate finally shifts
        let shifted = probs(0.4, 0.5, 0.2);
        snap.timestamp += 400;
        let fourth = selector.select(&input(&snap, &shifted, &r, &s), &guard);
        assert_eq!(fourth.action, Action::Close);
    }

    #[test]
    fn test_confidence_tracks_the_spread() {
        let selector = DecisionSelector::new();
        let snap = snapshot();
        let p = probs(0.7, 0.15, 0.6);
        let s = stop();

        let guard = AntiChurnGuard::new();
        let tight = report([0.30, 0.29, 0.25, 0.20, 0.0, 0.0], 0.5);
        let close_race = selector.select(&input(&snap, &p, &tight, &s), &guard);

        let guard = AntiChurnGuard::new();
        let wide = report([5.0, 0.5, 0.4, 0.3, 0.0, 0.0], 0.5);
        let runaway = selector.select(&input(&snap, &p, &wide, &s), &guard);

        assert!(runaway.confidence > close_race.confidence);
        assert!(close_race.confidence >= 60.0);
        assert!(runaway.confidence <= 95.0);
    }

    #[test]
    fn test_hold_never_blocked_by_guard() {
        let selector = DecisionSelector::new();
        let guard = AntiChurnGuard::new();
        let snap = snapshot();
        let p = probs(0.6, 0.2, 0.6);
        let r = report([0.5, 0.1, 0.1, 0.1, 0.0, 0.0], 0.3);
        let s = stop();

        for _ in 0..3 {
            let decision = selector.select(&input(&snap, &p, &r, &s), &guard);
            assert_eq!(decision.action, Action::Hold);
        }
        assert_eq!(guard.stats().actions_recorded, 0);
    }
}
