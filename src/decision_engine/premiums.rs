//! 💰 Risk Premiums
//!
//! Scalar EV adjustments, each in % of account equity and each independently
//! interpretable: exit pressure from profit at risk, peak giveback, account
//! drawdown, regime misalignment, news and weekend timing, order flow and
//! position age. The premiums are an ordered list of named functions so
//! every one of them can be unit tested on its own; the EV calculator just
//! sums them and applies the volatility-regime multiplier.

use chrono::Timelike;
use log::debug;

use crate::config::PremiumConfig;
use crate::decision_engine::peak_tracker::PeakRecord;
use crate::decision_engine::probability::ProbabilityEstimate;
use crate::snapshot::{MarketSnapshot, SetupType};

/// Everything a premium function is allowed to look at
pub struct PremiumContext<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub probs: &'a ProbabilityEstimate,

    /// Move exhaustion score, 0-1
    pub exhaustion: f64,

    /// Current unrealized profit, % of account
    pub profit_pct: f64,

    /// Fraction of the peak given back, 0-1
    pub giveback: f64,

    pub peak: Option<&'a PeakRecord>,
    pub setup: SetupType,

    /// Position notional over account equity
    pub size_ratio: f64,
}

/// One named premium
pub struct RiskPremium {
    pub name: &'static str,
    compute: fn(&PremiumContext, &PremiumConfig) -> f64,
}

impl RiskPremium {
    pub fn compute(&self, ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
        (self.compute)(ctx, cfg).max(0.0)
    }
}

/// The ordered premium list the engine evaluates
pub fn default_premiums() -> Vec<RiskPremium> {
    vec![
        RiskPremium {
            name: "profit_protection",
            compute: profit_protection,
        },
        RiskPremium {
            name: "peak_giveback",
            compute: peak_giveback,
        },
        RiskPremium {
            name: "drawdown_exit",
            compute: drawdown_exit,
        },
        RiskPremium {
            name: "regime_exit",
            compute: regime_exit,
        },
        RiskPremium {
            name: "news_risk",
            compute: news_risk,
        },
        RiskPremium {
            name: "weekend_risk",
            compute: weekend_risk,
        },
        RiskPremium {
            name: "order_flow",
            compute: order_flow,
        },
        RiskPremium {
            name: "age_decay",
            compute: age_decay,
        },
    ]
}

/// Premium evaluation result
#[derive(Debug, Clone)]
pub struct PremiumReport {
    /// (name, value) per premium, in evaluation order
    pub parts: Vec<(&'static str, f64)>,

    /// Sum before the regime multiplier
    pub subtotal: f64,

    /// Volatility regime multiplier applied to the subtotal
    pub multiplier: f64,

    /// subtotal x multiplier, % of account
    pub total: f64,
}

impl PremiumReport {
    pub fn breakdown(&self) -> String {
        let parts: Vec<String> = self
            .parts
            .iter()
            .filter(|(_, v)| *v > 0.0005)
            .map(|(name, v)| format!("{}={:.3}", name, v))
            .collect();
        format!(
            "premiums={:.3} (x{:.2}; {})",
            self.total,
            self.multiplier,
            if parts.is_empty() {
                "none".to_string()
            } else {
                parts.join(", ")
            }
        )
    }
}

/// Evaluate the full premium list and apply the regime multiplier
pub fn evaluate_premiums(
    premiums: &[RiskPremium],
    ctx: &PremiumContext,
    cfg: &PremiumConfig,
) -> PremiumReport {
    let parts: Vec<(&'static str, f64)> = premiums
        .iter()
        .map(|p| (p.name, p.compute(ctx, cfg)))
        .collect();
    let subtotal: f64 = parts.iter().map(|(_, v)| v).sum();
    let multiplier = volatility_regime_multiplier(ctx.snapshot, ctx.setup, cfg);
    let report = PremiumReport {
        parts,
        subtotal,
        multiplier,
        total: subtotal * multiplier,
    };
    debug!("{} {}", ctx.snapshot.symbol, report.breakdown());
    report
}

/// ATR regime of the setup's canonical timeframe scales every other premium.
pub fn volatility_regime_multiplier(
    snapshot: &MarketSnapshot,
    setup: SetupType,
    cfg: &PremiumConfig,
) -> f64 {
    let (primary, _) = setup.stop_timeframes();
    let atr = snapshot.timeframes.get(primary).atr;
    if atr <= 0.0 || snapshot.current_price <= 0.0 {
        return 1.0;
    }
    let atr_pct = atr / snapshot.current_price * 100.0;
    if atr_pct <= cfg.vol_low_atr_pct {
        cfg.vol_multiplier_low
    } else if atr_pct >= cfg.vol_high_atr_pct {
        cfg.vol_multiplier_high
    } else {
        let t = (atr_pct - cfg.vol_low_atr_pct) / (cfg.vol_high_atr_pct - cfg.vol_low_atr_pct);
        cfg.vol_multiplier_low + t * (cfg.vol_multiplier_high - cfg.vol_multiplier_low)
    }
}

/// Profit at risk x protection urgency. Nothing to protect, nothing charged.
fn profit_protection(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    let profit_at_risk = ctx.profit_pct.max(0.0)
        * ctx.probs.reversal
        * (1.0 - ctx.probs.thesis_quality);
    if profit_at_risk <= 0.0 {
        return 0.0;
    }
    let urgency = (cfg.urgency_exhaustion_weight * ctx.exhaustion
        + cfg.urgency_ml_weight * ctx.snapshot.ml_disagreement()
        + cfg.urgency_htf_weight * ctx.snapshot.htf_opposition()
        + cfg.urgency_divergence_weight * ctx.snapshot.volume.volume_divergence)
        .clamp(0.0, 1.0);
    profit_at_risk * urgency
}

/// Charged once the giveback exceeds what this thesis and size deserve.
/// Larger positions get a tighter allowance.
fn peak_giveback(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    let peak = match ctx.peak {
        Some(p) if p.peak_profit_pct > 0.0 => p,
        _ => return 0.0,
    };
    let size_norm = (ctx.size_ratio / cfg.giveback_size_norm_ratio).clamp(0.0, 1.0);
    let allowance = (cfg.giveback_base_allowance
        + cfg.giveback_thesis_bonus * ctx.probs.thesis_quality
        - cfg.giveback_size_tightening * size_norm)
        .clamp(cfg.giveback_min_allowance, cfg.giveback_max_allowance);
    if ctx.giveback <= allowance {
        return 0.0;
    }
    (ctx.giveback - allowance) * peak.peak_profit_pct * cfg.giveback_scale
}

/// Account drawdown pressure, amplified for positions held past their
/// setup's expected duration.
fn drawdown_exit(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    let account = &ctx.snapshot.account;
    let total_severity = if account.max_total_drawdown > 0.0 {
        (account.total_drawdown / account.max_total_drawdown).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let daily_severity = if account.max_daily_loss > 0.0 {
        ((-account.daily_pnl) / account.max_daily_loss).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let severity = total_severity.max(daily_severity);
    if severity <= 0.0 {
        return 0.0;
    }

    let expected = ctx.setup.expected_duration_minutes();
    let age_ratio = ctx.snapshot.position.age_minutes / expected;
    let age_amplifier = age_ratio
        .max(1.0)
        .powf(cfg.drawdown_age_exponent)
        .min(cfg.drawdown_age_cap);

    cfg.drawdown_weight * severity * (1.0 - ctx.probs.thesis_quality) * age_amplifier
}

/// Holding against the cross-asset tide costs extra
fn regime_exit(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    let direction = ctx.snapshot.direction();
    let risk_misalign = (-ctx.snapshot.regime.risk_appetite * direction).max(0.0);
    let dollar_misalign = (-ctx.snapshot.regime.dollar_strength * direction).max(0.0);
    cfg.regime_weight * (0.6 * risk_misalign + 0.4 * dollar_misalign)
}

/// Exit pressure ramps into a high-impact event; a strong thesis earns relief
fn news_risk(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    let news = &ctx.snapshot.news;
    let proximity = if news.high_impact_imminent {
        1.0
    } else if news.minutes_until_next_event < cfg.news_window_minutes {
        1.0 - news.minutes_until_next_event / cfg.news_window_minutes
    } else {
        return 0.0;
    };
    let relief = 1.0 - cfg.thesis_relief * ctx.probs.thesis_quality;
    cfg.news_weight * proximity * relief
}

/// Friday-afternoon gap risk, ramping toward the close
fn weekend_risk(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    if !ctx.snapshot.is_friday_afternoon() {
        return 0.0;
    }
    let hour = ctx.snapshot.eval_time().hour() as f64;
    let ramp = ((hour - 14.0) / 8.0).clamp(0.0, 1.0);
    let relief = 1.0 - cfg.thesis_relief * ctx.probs.thesis_quality;
    cfg.weekend_weight * ramp * relief
}

/// Order book leaning against the position
fn order_flow(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    let adverse =
        (-ctx.snapshot.volume.order_flow_imbalance * ctx.snapshot.direction()).max(0.0);
    cfg.order_flow_weight * adverse
}

/// Time decay: a position overdue for its setup type bleeds expectancy
fn age_decay(ctx: &PremiumContext, cfg: &PremiumConfig) -> f64 {
    let expected = ctx.setup.expected_duration_minutes();
    let overdue = (ctx.snapshot.position.age_minutes / expected - 1.0)
        .max(0.0)
        .min(cfg.age_decay_cap);
    cfg.age_decay_weight * overdue
}
