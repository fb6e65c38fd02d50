use serde::{Deserialize, Serialize};

pub const ALIGNMENT_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub arousal_factor: f64,
    pub decay_rate: f64,
    pub alignment_impact: f64,
    /// Per-cycle pull of alignment back toward 1.0.
    pub recovery_rate: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        DriftConfig {
            arousal_factor: 0.1,
            decay_rate: 0.05,
            alignment_impact: 0.8,
            recovery_rate: 0.02,
        }
    }
}

/// Accumulated directional deviation in (valence, arousal, entropy) space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftModel {
    vector: [f64; 3],
    magnitude: f64,
}

impl DriftModel {
    pub fn new() -> Self {
        DriftModel::default()
    }

    pub fn vector(&self) -> [f64; 3] {
        self.vector
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn update(
        &mut self,
        valence: f64,
        arousal: f64,
        entropy: f64,
        decay_rate: f64,
        arousal_factor: f64,
    ) {
        if arousal > 0.5 || valence.abs() > 0.5 {
            self.vector[0] += valence * arousal_factor;
            self.vector[1] += arousal * arousal_factor;
            self.vector[2] += (entropy - 0.5) * arousal_factor;
        }
        self.magnitude = norm(&self.vector);
        if self.magnitude > 0.05 {
            tracing::debug!(magnitude = self.magnitude, "drift.detected");
        }
        let keep = (1.0 - decay_rate).clamp(0.0, 1.0);
        for component in &mut self.vector {
            *component *= keep;
        }
    }

    pub fn apply_alignment_penalty(&self, alignment: f64, impact_factor: f64) -> f64 {
        let penalised = alignment - self.magnitude * impact_factor;
        penalised.clamp(ALIGNMENT_FLOOR, 1.0)
    }

    /// Recovery, then drift penalty, in one step.
    pub fn next_alignment(&self, alignment: f64, cfg: &DriftConfig) -> f64 {
        let recovered = (alignment + cfg.recovery_rate).min(1.0);
        self.apply_alignment_penalty(recovered, cfg.alignment_impact)
    }

    #[cfg(test)]
    pub(crate) fn force_magnitude(&mut self, magnitude: f64) {
        self.magnitude = magnitude;
    }
}

fn norm(v: &[f64; 3]) -> f64 {
    v.iter().map(|c| c * c).sum::<f64>().sqrt()
}
