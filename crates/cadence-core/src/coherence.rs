use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::clamp_logged;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceConfig {
    pub alignment_weight: f64,
    pub pressure_weight: f64,
    pub urgency_weight: f64,
    pub entropy_weight: f64,
    pub momentum_weight: f64,
    pub entropy_window: usize,
    pub momentum_threshold: f64,
    pub urgency_impact: f64,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        CoherenceConfig {
            alignment_weight: 0.3,
            pressure_weight: 0.25,
            urgency_weight: 0.2,
            entropy_weight: 0.25,
            momentum_weight: 0.3,
            entropy_window: 50,
            momentum_threshold: 0.02,
            urgency_impact: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoherenceInputs {
    pub alignment: f64,
    /// Heat relative to capacity, `[0, 1]`.
    pub heat_pressure: f64,
    pub urgency: f64,
    pub entropy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumStep {
    pub momentum: f64,
    pub tracer_urgency: f64,
}

/// Composite coherence ("SCUP") over a sliding entropy window.
#[derive(Debug, Clone)]
pub struct CoherenceScorer {
    cfg: CoherenceConfig,
    entropy_window: VecDeque<f64>,
}

impl CoherenceScorer {
    pub fn new(cfg: CoherenceConfig) -> Self {
        let capacity = cfg.entropy_window.max(1);
        CoherenceScorer {
            cfg,
            entropy_window: VecDeque::with_capacity(capacity),
        }
    }

    pub fn entropy_trend(&self) -> f64 {
        if self.entropy_window.is_empty() {
            return 0.0;
        }
        self.entropy_window.iter().sum::<f64>() / self.entropy_window.len() as f64
    }

    pub fn compute(&mut self, inputs: CoherenceInputs, momentum: f64) -> f64 {
        if self.entropy_window.len() >= self.cfg.entropy_window.max(1) {
            self.entropy_window.pop_front();
        }
        self.entropy_window.push_back(inputs.entropy.clamp(0.0, 1.0));

        let cfg = &self.cfg;
        let raw = cfg.alignment_weight * inputs.alignment
            + cfg.pressure_weight * (1.0 - inputs.heat_pressure)
            + cfg.urgency_weight * (1.0 - inputs.urgency)
            + cfg.entropy_weight * (1.0 - self.entropy_trend())
            + cfg.momentum_weight * momentum;
        clamp_logged("coherence", raw, 0.0, 1.0)
    }

    /// Momentum for the next cycle and the urgency bias it implies.
    pub fn momentum_step(&self, coherence: f64, previous: f64, urgency: f64) -> MomentumStep {
        let momentum = coherence - previous;
        let threshold = self.cfg.momentum_threshold;
        let tracer_urgency = if momentum > threshold {
            urgency * (1.0 - self.cfg.urgency_impact * momentum)
        } else if momentum < -threshold {
            urgency * 1.2
        } else {
            urgency
        };
        MomentumStep {
            momentum,
            tracer_urgency: tracer_urgency.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(alignment: f64, heat_pressure: f64, urgency: f64, entropy: f64) -> CoherenceInputs {
        CoherenceInputs {
            alignment,
            heat_pressure,
            urgency,
            entropy,
        }
    }

    #[test]
    fn coherence_stays_in_unit_interval() {
        let mut scorer = CoherenceScorer::new(CoherenceConfig::default());
        assert_eq!(scorer.compute(inputs(1.0, 0.0, 0.0, 0.0), 5.0), 1.0);
        assert_eq!(scorer.compute(inputs(0.0, 1.0, 1.0, 1.0), -5.0), 0.0);
    }

    #[test]
    fn healthier_inputs_score_higher() {
        let mut good = CoherenceScorer::new(CoherenceConfig::default());
        let mut bad = CoherenceScorer::new(CoherenceConfig::default());
        let high = good.compute(inputs(0.9, 0.1, 0.2, 0.2), 0.0);
        let low = bad.compute(inputs(0.3, 0.8, 0.9, 0.8), 0.0);
        assert!(high > low);
    }

    #[test]
    fn entropy_window_is_bounded() {
        let cfg = CoherenceConfig {
            entropy_window: 3,
            ..CoherenceConfig::default()
        };
        let mut scorer = CoherenceScorer::new(cfg);
        for entropy in [1.0, 1.0, 1.0, 0.0, 0.0, 0.0] {
            scorer.compute(inputs(0.5, 0.5, 0.5, entropy), 0.0);
        }
        assert_eq!(scorer.entropy_trend(), 0.0);
    }

    #[test]
    fn rising_coherence_relaxes_urgency() {
        let scorer = CoherenceScorer::new(CoherenceConfig::default());
        let up = scorer.momentum_step(0.8, 0.6, 0.5);
        assert!(up.tracer_urgency < 0.5);
        let down = scorer.momentum_step(0.4, 0.6, 0.5);
        assert!((down.tracer_urgency - 0.6).abs() < 1e-12);
        let flat = scorer.momentum_step(0.6, 0.6, 0.5);
        assert_eq!(flat.tracer_urgency, 0.5);
        assert_eq!(scorer.momentum_step(0.2, 0.9, 0.95).tracer_urgency, 1.0);
    }
}
