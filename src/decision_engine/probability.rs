//! 🎲 Probability Model
//!
//! Turns a snapshot into continuation / reversal / flat probabilities plus a
//! thesis-quality score. Higher-timeframe structure and the ML call are
//! blended with a three-tier weighting: when the HTF ladder already backs
//! the position, structure outranks the model; when it doesn't, the model
//! outranks structure.

use log::debug;

use crate::config::ProbabilityConfig;
use crate::snapshot::{MarketSnapshot, MlDirection, SetupType, Timeframe};

/// Probability estimate for the open position
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityEstimate {
    /// P(move continues in the position's favor)
    pub continuation: f64,

    /// P(move reverses against the position)
    pub reversal: f64,

    /// P(price goes nowhere useful)
    pub flat: f64,

    /// 0-1 composite of HTF and ML agreement with the position
    pub thesis_quality: f64,

    /// ML agreement factor that went into the blend
    pub ml_factor: f64,

    /// Weighted HTF support that went into the blend
    pub htf_support: f64,
}

impl ProbabilityEstimate {
    /// Model uncertainty: 1 when continuation and reversal are tied
    pub fn uncertainty(&self) -> f64 {
        1.0 - (self.continuation - self.reversal).abs()
    }

    /// Compact string for the decision journal
    pub fn breakdown(&self) -> String {
        format!(
            "cont={:.2} rev={:.2} flat={:.2} thesis={:.2} (ml={:.2}, htf={:.2})",
            self.continuation,
            self.reversal,
            self.flat,
            self.thesis_quality,
            self.ml_factor,
            self.htf_support
        )
    }
}

/// Estimates continuation/reversal/flat probabilities for one position
pub struct ProbabilityModel {
    config: ProbabilityConfig,
}

impl ProbabilityModel {
    pub fn new() -> Self {
        Self::with_config(ProbabilityConfig::default())
    }

    pub fn with_config(config: ProbabilityConfig) -> Self {
        Self { config }
    }

    /// Estimate probabilities for the snapshot's open position.
    ///
    /// The caller is responsible for short-circuiting to HOLD when
    /// [`MarketSnapshot::htf_data_missing`] is set; this function assumes
    /// real indicator data.
    pub fn estimate(&self, snapshot: &MarketSnapshot, setup: SetupType) -> ProbabilityEstimate {
        let cfg = &self.config;

        let (htf_support, strongly_aligned) = self.htf_support(snapshot);
        let ml_weight = self.ml_weight(strongly_aligned);
        let ml_factor = self.ml_factor(snapshot, htf_support);

        let base = ml_weight * ml_factor + (1.0 - ml_weight) * htf_support;
        let opposition = ml_weight * (1.0 - ml_factor) + (1.0 - ml_weight) * (1.0 - htf_support);

        let momentum = cfg.momentum_weight * self.favorable_momentum(snapshot, setup);
        let rsi_exhaustion = cfg.rsi_weight * self.rsi_extremeness(snapshot);
        let structure = cfg.structure_weight
            * (snapshot.structure.structure_break * snapshot.direction()).clamp(-1.0, 1.0);
        let divergence = cfg.divergence_weight * snapshot.volume.volume_divergence.clamp(0.0, 1.0);

        let mut continuation = (base + momentum + structure - rsi_exhaustion - divergence)
            .clamp(cfg.min_probability, cfg.max_probability);
        let mut reversal = (cfg.reversal_damping * opposition - momentum - structure
            + rsi_exhaustion
            + divergence)
            .clamp(cfg.min_probability, cfg.max_probability);

        // Keep room for the flat outcome
        let combined = continuation + reversal;
        if combined > cfg.max_combined {
            let rescale = cfg.max_combined / combined;
            continuation *= rescale;
            reversal *= rescale;
        }
        let flat = (1.0 - continuation - reversal).max(0.0);

        let thesis_quality = (0.5 * ml_factor + 0.5 * htf_support).clamp(0.0, 1.0);

        let estimate = ProbabilityEstimate {
            continuation,
            reversal,
            flat,
            thesis_quality,
            ml_factor,
            htf_support,
        };

        debug!(
            "{} probabilities: {} (aligned_htf={}, ml_weight={:.2})",
            snapshot.symbol,
            estimate.breakdown(),
            strongly_aligned,
            ml_weight
        );

        estimate
    }

    /// Weighted HTF support and the count of strongly aligned timeframes
    fn htf_support(&self, snapshot: &MarketSnapshot) -> (f64, usize) {
        let cfg = &self.config;
        let d1 = snapshot.tf_support(Timeframe::D1);
        let h4 = snapshot.tf_support(Timeframe::H4);
        let h1 = snapshot.tf_support(Timeframe::H1);

        let support = cfg.htf_weight_d1 * d1 + cfg.htf_weight_h4 * h4 + cfg.htf_weight_h1 * h1;
        let strongly_aligned = [d1, h4, h1]
            .iter()
            .filter(|&&s| s > cfg.strong_support_threshold)
            .count();

        (support.clamp(0.0, 1.0), strongly_aligned)
    }

    /// Three-tier ML weighting: structure earns trust by agreeing with itself
    fn ml_weight(&self, strongly_aligned: usize) -> f64 {
        match strongly_aligned {
            3.. => self.config.ml_weight_structure_strong,
            2 => self.config.ml_weight_neutral,
            _ => self.config.ml_weight_structure_weak,
        }
    }

    /// ML agreement factor. An opposed call is softened toward neutral while
    /// the HTF ladder still backs the position, so a single-tick model flip
    /// cannot invert the estimate on its own.
    fn ml_factor(&self, snapshot: &MarketSnapshot, htf_support: f64) -> f64 {
        let cfg = &self.config;
        let confidence = (snapshot.ml.confidence / 100.0).clamp(0.0, 1.0);

        let raw = match snapshot.ml.direction {
            MlDirection::Hold => cfg.ml_neutral_factor,
            _ if snapshot.ml_agrees() => confidence,
            _ => 1.0 - confidence,
        };

        let opposed = !snapshot.ml_agrees() && snapshot.ml.direction != MlDirection::Hold;
        if opposed && htf_support >= cfg.strong_support_threshold {
            0.5 * raw + 0.5 * cfg.ml_neutral_factor
        } else {
            raw
        }
    }

    /// Multi-timeframe momentum in the position's favor, -1 to +1,
    /// weighted by what the setup type actually trades on
    fn favorable_momentum(&self, snapshot: &MarketSnapshot, setup: SetupType) -> f64 {
        let weights = match setup {
            SetupType::Scalp => [0.30, 0.25, 0.25, 0.15, 0.05],
            SetupType::Day => [0.10, 0.15, 0.30, 0.30, 0.15],
            SetupType::Swing => [0.05, 0.10, 0.20, 0.30, 0.35],
        };
        let direction = snapshot.direction();
        Timeframe::DECISION
            .iter()
            .zip(weights.iter())
            .map(|(&tf, &w)| w * snapshot.timeframes.get(tf).momentum * direction)
            .sum::<f64>()
            .clamp(-1.0, 1.0)
    }

    /// How deep into exhaustion territory the RSI ladder sits, 0-1.
    /// For a long that means overbought; for a short, oversold.
    fn rsi_extremeness(&self, snapshot: &MarketSnapshot) -> f64 {
        let cfg = &self.config;
        let long = snapshot.direction() > 0.0;
        let htf_weights = [cfg.htf_weight_h1, cfg.htf_weight_h4, cfg.htf_weight_d1];
        Timeframe::HTF
            .iter()
            .zip(htf_weights.iter())
            .map(|(&tf, &w)| {
                let rsi = snapshot.timeframes.get(tf).rsi;
                let extremeness = if long {
                    (rsi - 70.0) / 30.0
                } else {
                    (30.0 - rsi) / 30.0
                };
                w * extremeness.clamp(0.0, 1.0)
            })
            .sum()
    }
}

impl Default for ProbabilityModel {
    fn default() -> Self {
        Self::new()
    }
}
