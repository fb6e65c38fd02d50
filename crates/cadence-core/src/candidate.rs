use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::clamp_logged;

const NEUTRAL_MOOD: f64 = 0.5;

/// Vitality associated with each known mood label.
const MOOD_VITALITY: &[(&str, f64)] = &[
    ("joyful", 0.9),
    ("content", 0.8),
    ("curious", 0.75),
    ("calm", 0.7),
    ("neutral", 0.5),
    ("anxious", 0.35),
    ("sad", 0.3),
    ("angry", 0.25),
    ("drained", 0.2),
];

pub fn mood_vitality(mood: &str) -> f64 {
    let mood = mood.trim().to_ascii_lowercase();
    MOOD_VITALITY
        .iter()
        .find(|(name, _)| *name == mood)
        .map(|(_, v)| *v)
        .unwrap_or(NEUTRAL_MOOD)
}

/// A unit of deferred work waiting for a quiet moment to be re-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebloomCandidate {
    pub seed_id: String,
    pub trust_score: f64,
    pub entropy_score: f64,
    pub reinforcement_count: u32,
    pub grid_position: Option<(i32, i32)>,
    pub mood_weights: BTreeMap<String, f64>,
    pub generation: u32,
    pub vitality: f64,
    /// Set by the queue on enqueue.
    #[serde(default)]
    pub rebloom_tag: Option<String>,
}

impl RebloomCandidate {
    pub fn new(seed_id: impl Into<String>, trust_score: f64, entropy_score: f64) -> Self {
        let mut candidate = RebloomCandidate {
            seed_id: seed_id.into(),
            trust_score: clamp_logged("trust_score", trust_score, 0.0, 1.0),
            entropy_score: clamp_logged("entropy_score", entropy_score, 0.0, 1.0),
            reinforcement_count: 0,
            grid_position: None,
            mood_weights: BTreeMap::new(),
            generation: 1,
            vitality: 0.0,
            rebloom_tag: None,
        };
        candidate.vitality = candidate.compute_vitality();
        candidate
    }

    pub fn with_reinforcement(mut self, count: u32) -> Self {
        self.reinforcement_count = count;
        self
    }

    pub fn with_position(mut self, col: i32, row: i32) -> Self {
        self.grid_position = Some((col, row));
        self
    }

    pub fn with_moods<I, S>(mut self, moods: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        self.mood_weights = moods.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.vitality = self.compute_vitality();
        self
    }

    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation.max(1);
        self
    }

    /// Weighted mean of the mood table; 0.5 when there is nothing usable.
    pub fn mood_score(&self) -> f64 {
        let mut total = 0.0;
        let mut weighted = 0.0;
        for (mood, weight) in &self.mood_weights {
            if !(weight.is_finite() && *weight > 0.0) {
                continue;
            }
            total += weight;
            weighted += weight * mood_vitality(mood);
        }
        if total <= 0.0 {
            return NEUTRAL_MOOD;
        }
        weighted / total
    }

    fn compute_vitality(&self) -> f64 {
        let stability = 1.0 - self.entropy_score;
        let raw = 0.4 * self.trust_score + 0.3 * stability + 0.3 * self.mood_score();
        raw.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_missing_moods_are_neutral() {
        let bare = RebloomCandidate::new("a", 0.5, 0.5);
        assert_eq!(bare.mood_score(), 0.5);
        let odd = RebloomCandidate::new("b", 0.5, 0.5).with_moods([("bewildered", 1.0)]);
        assert_eq!(odd.mood_score(), 0.5);
        assert_eq!(bare.vitality, odd.vitality);
    }

    #[test]
    fn mood_weights_blend_vitality() {
        let candidate =
            RebloomCandidate::new("a", 0.5, 0.5).with_moods([("joyful", 1.0), ("drained", 1.0)]);
        assert!((candidate.mood_score() - 0.55).abs() < 1e-12);
        let joyful = RebloomCandidate::new("b", 0.5, 0.5).with_moods([("Joyful", 2.0)]);
        assert!(joyful.vitality > candidate.vitality);
    }

    #[test]
    fn inputs_are_clamped() {
        let candidate = RebloomCandidate::new("a", 3.0, f64::NAN).with_generation(0);
        assert_eq!(candidate.trust_score, 1.0);
        assert_eq!(candidate.entropy_score, 0.0);
        assert_eq!(candidate.generation, 1);
        assert!(candidate.vitality <= 1.0);
    }
}
