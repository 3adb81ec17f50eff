//! 📊 Score Engine
//!
//! Three independent 0-1 scores, each a pure function of the snapshot:
//! - exit_score: how loudly the chart argues for getting out
//! - entry_score: how justified adding exposure would be
//! - exhaustion_score: how much of the move is already spent
//!
//! All three scan M15 through D1; M1/M5 are excluded as noise for this
//! holding horizon.

use log::debug;

use crate::config::ScoringConfig;
use crate::snapshot::{MarketSnapshot, Timeframe};

/// One computed score plus the journal breakdown
#[derive(Debug, Clone)]
pub struct Score {
    /// 0.0 - 1.0
    pub value: f64,

    /// Compact component listing for the decision journal
    pub breakdown: String,
}

impl Score {
    fn new(value: f64, breakdown: String) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            breakdown,
        }
    }
}

/// Computes exit / entry / exhaustion scores from one snapshot
pub struct ScoreEngine {
    config: ScoringConfig,
}

impl ScoreEngine {
    pub fn new() -> Self {
        Self::with_config(ScoringConfig::default())
    }

    pub fn with_config(config: ScoringConfig) -> Self {
        Self { config }
    }

    fn scan_weights(&self) -> [(Timeframe, f64); 5] {
        let c = &self.config;
        [
            (Timeframe::M15, c.weight_m15),
            (Timeframe::M30, c.weight_m30),
            (Timeframe::H1, c.weight_h1),
            (Timeframe::H4, c.weight_h4),
            (Timeframe::D1, c.weight_d1),
        ]
    }

    /// Exit attractiveness: weighted opposition vs support across the scan
    /// ladder plus ML, alignment, divergence, structure and giveback terms,
    /// normalized to opposition / (opposition + support).
    pub fn exit_score(&self, snapshot: &MarketSnapshot, giveback: f64) -> Score {
        let cfg = &self.config;
        let direction = snapshot.direction();
        let long = direction > 0.0;

        let mut opposition = 0.0;
        let mut support = 0.0;

        for (tf, weight) in self.scan_weights() {
            let ind = snapshot.timeframes.get(tf);
            let tf_support = snapshot.tf_support(tf);

            opposition += weight * ((0.5 - tf_support) * 2.0).max(0.0);
            support += weight * ((tf_support - 0.5) * 2.0).max(0.0);

            opposition += weight * (-ind.momentum * direction).max(0.0);
            support += weight * (ind.momentum * direction).max(0.0);

            let rsi_adverse = if long {
                (ind.rsi - cfg.rsi_overbought) / (100.0 - cfg.rsi_overbought)
            } else {
                (cfg.rsi_oversold - ind.rsi) / cfg.rsi_oversold
            };
            opposition += weight * rsi_adverse.clamp(0.0, 1.0);

            if ind.atr > 0.0 {
                let macd_norm = (ind.macd * direction / ind.atr).clamp(-1.0, 1.0);
                opposition += weight * (-macd_norm).max(0.0);
                support += weight * macd_norm.max(0.0);
            }

            let bb_extension = if long {
                (ind.bollinger_position - 0.8) / 0.2
            } else {
                (0.2 - ind.bollinger_position) / 0.2
            };
            opposition += weight * bb_extension.clamp(0.0, 1.0);
        }

        let ml_opposed = snapshot.ml_disagreement();
        opposition += cfg.ml_opposition_weight * ml_opposed;
        if snapshot.ml_agrees() {
            support += cfg.ml_opposition_weight * (snapshot.ml.confidence / 100.0).clamp(0.0, 1.0);
        }

        let alignment = snapshot.alignment.alignment_score;
        if alignment < cfg.weak_alignment_threshold {
            opposition += cfg.alignment_weight
                * ((cfg.weak_alignment_threshold - alignment) / cfg.weak_alignment_threshold);
        }

        let divergence = snapshot.volume.volume_divergence.clamp(0.0, 1.0);
        opposition += cfg.divergence_exit_weight * divergence;

        let structure_adverse = (-snapshot.structure.structure_break * direction).max(0.0);
        opposition += cfg.structure_exit_weight * structure_adverse;
        support += cfg.structure_exit_weight
            * (snapshot.structure.structure_break * direction).max(0.0);

        opposition += cfg.giveback_exit_weight * giveback.clamp(0.0, 1.0);

        let value = opposition / (opposition + support + cfg.epsilon);
        let breakdown = format!(
            "exit={:.2} (opp={:.2}, sup={:.2}, ml_opp={:.2}, div={:.2}, giveback={:.2})",
            value, opposition, support, ml_opposed, divergence, giveback
        );
        debug!("{} {}", snapshot.symbol, breakdown);
        Score::new(value, breakdown)
    }

    /// Entry/add attractiveness: the mirror construction. Volume divergence
    /// past the soft threshold strongly damps the result - adding into
    /// unconfirmed price is how winners turn into donations.
    pub fn entry_score(&self, snapshot: &MarketSnapshot) -> Score {
        let cfg = &self.config;
        let direction = snapshot.direction();
        let long = direction > 0.0;

        let mut favor = 0.0;
        let mut against = 0.0;

        for (tf, weight) in self.scan_weights() {
            let ind = snapshot.timeframes.get(tf);
            let tf_support = snapshot.tf_support(tf);

            favor += weight * ((tf_support - 0.5) * 2.0).max(0.0);
            against += weight * ((0.5 - tf_support) * 2.0).max(0.0);

            favor += weight * (ind.momentum * direction).max(0.0);
            against += weight * (-ind.momentum * direction).max(0.0);

            // Room to run: RSI not yet at the extreme for this direction
            let headroom = if long {
                (cfg.rsi_overbought - ind.rsi) / cfg.rsi_overbought
            } else {
                (ind.rsi - cfg.rsi_oversold) / (100.0 - cfg.rsi_oversold)
            };
            favor += weight * 0.5 * headroom.clamp(0.0, 1.0);

            if ind.atr > 0.0 {
                let macd_norm = (ind.macd * direction / ind.atr).clamp(-1.0, 1.0);
                favor += weight * macd_norm.max(0.0);
                against += weight * (-macd_norm).max(0.0);
            }
        }

        if snapshot.ml_agrees() {
            favor += cfg.ml_opposition_weight * (snapshot.ml.confidence / 100.0).clamp(0.0, 1.0);
        }
        against += cfg.ml_opposition_weight * snapshot.ml_disagreement();

        let alignment = snapshot.alignment.alignment_score;
        if alignment > cfg.weak_alignment_threshold {
            favor += cfg.alignment_weight
                * ((alignment - cfg.weak_alignment_threshold)
                    / (1.0 - cfg.weak_alignment_threshold));
        }

        let structure_favor = (snapshot.structure.structure_break * direction).max(0.0);
        favor += cfg.structure_exit_weight * structure_favor;
        against += cfg.structure_exit_weight
            * (-snapshot.structure.structure_break * direction).max(0.0);

        let mut value = favor / (favor + against + cfg.epsilon);

        let divergence = snapshot.volume.volume_divergence.clamp(0.0, 1.0);
        let damped = divergence > cfg.entry_divergence_threshold;
        if damped {
            value *= cfg.entry_divergence_damping;
        }

        let breakdown = format!(
            "entry={:.2} (favor={:.2}, against={:.2}, div={:.2}{})",
            value,
            favor,
            against,
            divergence,
            if damped { ", damped" } else { "" }
        );
        debug!("{} {}", snapshot.symbol, breakdown);
        Score::new(value, breakdown)
    }

    /// Move exhaustion: 0 = more to give, 1 = running on fumes.
    pub fn exhaustion_score(&self, snapshot: &MarketSnapshot) -> Score {
        let cfg = &self.config;
        let direction = snapshot.direction();
        let long = direction > 0.0;

        // Momentum failing underneath a still-extended trend
        let mut momentum_div = 0.0;
        let mut macd_div = 0.0;
        for &tf in Timeframe::HTF.iter() {
            let ind = snapshot.timeframes.get(tf);
            let extended = ((snapshot.tf_support(tf) - 0.6) / 0.4).clamp(0.0, 1.0);
            let momentum_norm = ((ind.momentum * direction) + 1.0) / 2.0;
            momentum_div += extended * (1.0 - momentum_norm);
            if extended > 0.0 && ind.macd * direction <= 0.0 {
                macd_div += extended;
            }
        }
        momentum_div /= Timeframe::HTF.len() as f64;
        macd_div /= Timeframe::HTF.len() as f64;

        // Worst RSI extreme on the ladder
        let rsi_extreme = Timeframe::HTF
            .iter()
            .map(|&tf| {
                let rsi = snapshot.timeframes.get(tf).rsi;
                if long {
                    ((rsi - cfg.rsi_overbought) / (100.0 - cfg.rsi_overbought)).clamp(0.0, 1.0)
                } else {
                    ((cfg.rsi_oversold - rsi) / cfg.rsi_oversold).clamp(0.0, 1.0)
                }
            })
            .fold(0.0_f64, f64::max);

        // HTF volume drying up while the move is supposed to be trending
        let volume_fade = Timeframe::HTF
            .iter()
            .map(|&tf| (-snapshot.timeframes.get(tf).volume_trend).max(0.0))
            .sum::<f64>()
            / Timeframe::HTF.len() as f64;

        // Next structural level close in the profit direction
        let d = snapshot.structure.distance_to_structure_atr;
        let structure_proximity = if d > 0.0 {
            (1.0 - d / 2.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Trend strength gone out of the move
        let low_adx = [Timeframe::H1, Timeframe::H4]
            .iter()
            .map(|&tf| {
                let adx = snapshot.timeframes.get(tf).adx;
                ((cfg.adx_floor - adx) / cfg.adx_floor).clamp(0.0, 1.0)
            })
            .sum::<f64>()
            / 2.0;

        // Cross-asset regime leaning against the position
        let regime = (-snapshot.regime.risk_appetite * direction).max(0.0);

        let value = cfg.exhaustion_momentum_weight * momentum_div
            + cfg.exhaustion_macd_weight * macd_div
            + cfg.exhaustion_rsi_weight * rsi_extreme
            + cfg.exhaustion_volume_weight * volume_fade
            + cfg.exhaustion_structure_weight * structure_proximity
            + cfg.exhaustion_adx_weight * low_adx
            + cfg.exhaustion_regime_weight * regime;

        let breakdown = format!(
            "exhaustion={:.2} (mom_div={:.2}, macd_div={:.2}, rsi={:.2}, vol={:.2}, struct={:.2}, adx={:.2})",
            value, momentum_div, macd_div, rsi_extreme, volume_fade, structure_proximity, low_adx
        );
        debug!("{} {}", snapshot.symbol, breakdown);
        Score::new(value, breakdown)
    }
}

impl Default for ScoreEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{MlDirection, MlPrediction, Side};

    fn snapshot_with_trend(trend: f64, momentum: f64) -> MarketSnapshot {
        let mut snap = MarketSnapshot::default();
        snap.symbol = "EURUSD".to_string();
        snap.current_price = 1.1000;
        snap.position.side = Side::Long;
        snap.position.volume = 0.1;
        snap.position.entry_price = 1.0950;
        snap.account.balance = 100_000.0;
        for ind in [
            &mut snap.timeframes.m15,
            &mut snap.timeframes.m30,
            &mut snap.timeframes.h1,
            &mut snap.timeframes.h4,
            &mut snap.timeframes.d1,
        ] {
            ind.trend = trend;
            ind.momentum = momentum;
            ind.atr = 0.0010;
            ind.macd = 0.0002 * momentum.signum();
            ind.adx = 30.0;
        }
        snap.alignment.alignment_score = trend;
        snap
    }

    #[test]
    fn test_exit_score_low_in_healthy_trend() {
        let engine = ScoreEngine::new();
        let snap = snapshot_with_trend(0.8, 0.4);
        let score = engine.exit_score(&snap, 0.0);
        assert!(score.value < 0.35, "exit score was {}", score.value);
    }

    #[test]
    fn test_exit_score_high_when_everything_opposes() {
        let engine = ScoreEngine::new();
        let mut snap = snapshot_with_trend(0.2, -0.5);
        snap.ml = MlPrediction {
            direction: MlDirection::Sell,
            confidence: 85.0,
        };
        snap.volume.volume_divergence = 0.7;
        snap.structure.structure_break = -0.8;
        let score = engine.exit_score(&snap, 0.5);
        assert!(score.value > 0.75, "exit score was {}", score.value);
    }

    #[test]
    fn test_exit_score_monotonic_in_giveback() {
        let engine = ScoreEngine::new();
        let snap = snapshot_with_trend(0.6, 0.1);
        let without = engine.exit_score(&snap, 0.0);
        let with = engine.exit_score(&snap, 0.8);
        assert!(with.value > without.value);
    }

    #[test]
    fn test_entry_score_damped_by_divergence() {
        let engine = ScoreEngine::new();
        let mut snap = snapshot_with_trend(0.8, 0.4);
        let clean = engine.entry_score(&snap);
        snap.volume.volume_divergence = 0.6;
        let diverged = engine.entry_score(&snap);
        assert!(clean.value > 0.5);
        assert!(diverged.value < clean.value * 0.5);
    }

    #[test]
    fn test_exhaustion_ordering() {
        let engine = ScoreEngine::new();

        // Fresh trend: strong momentum, volume expanding, no extremes
        let mut fresh = snapshot_with_trend(0.8, 0.6);
        for ind in [
            &mut fresh.timeframes.h1,
            &mut fresh.timeframes.h4,
            &mut fresh.timeframes.d1,
        ] {
            ind.volume_trend = 0.5;
        }

        // Spent trend: extended but momentum gone, RSI hot, volume fading,
        // structure overhead, ADX collapsing
        let mut spent = snapshot_with_trend(0.85, -0.4);
        for ind in [
            &mut spent.timeframes.h1,
            &mut spent.timeframes.h4,
            &mut spent.timeframes.d1,
        ] {
            ind.volume_trend = -0.6;
            ind.rsi = 86.0;
            ind.adx = 12.0;
            ind.macd = -0.0001;
        }
        spent.structure.distance_to_structure_atr = 0.5;

        let fresh_score = engine.exhaustion_score(&fresh);
        let spent_score = engine.exhaustion_score(&spent);
        assert!(fresh_score.value < 0.3, "fresh was {}", fresh_score.value);
        assert!(spent_score.value > 0.45, "spent was {}", spent_score.value);
    }

    #[test]
    fn test_scores_are_deterministic() {
        let engine = ScoreEngine::new();
        let snap = snapshot_with_trend(0.65, 0.2);
        let a = engine.exit_score(&snap, 0.25);
        let b = engine.exit_score(&snap, 0.25);
        assert_eq!(a.value, b.value);
        let c = engine.exhaustion_score(&snap);
        let d = engine.exhaustion_score(&snap);
        assert_eq!(c.value, d.value);
    }

    #[test]
    fn test_scores_bounded() {
        let engine = ScoreEngine::new();
        for (trend, momentum, div) in
            [(0.0, -1.0, 1.0), (1.0, 1.0, 0.0), (0.5, 0.0, 0.5)]
        {
            let mut snap = snapshot_with_trend(trend, momentum);
            snap.volume.volume_divergence = div;
            for score in [
                engine.exit_score(&snap, 1.0),
                engine.entry_score(&snap),
                engine.exhaustion_score(&snap),
            ] {
                assert!(score.value >= 0.0 && score.value <= 1.0);
            }
        }
    }
}
