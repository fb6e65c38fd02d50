use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::clamp_logged;

const STABILITY_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub capacity: f64,
    pub generation_base: f64,
    pub dissipation_base: f64,
    /// Activity below this counts as idle for stasis detection.
    pub stasis_threshold: f64,
    /// Coherence above this counts as "busy" for stasis detection.
    pub stasis_coherence: f64,
    /// Share of stasis heat folded into the shared pool each update.
    pub stasis_fold: f64,
    pub cooling_rate: f64,
    pub pressure_gain: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        ThermalConfig {
            capacity: 1.0,
            generation_base: 0.02,
            dissipation_base: 0.1,
            stasis_threshold: 0.1,
            stasis_coherence: 0.8,
            stasis_fold: 0.1,
            cooling_rate: 0.1,
            pressure_gain: 0.08,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThermalModel {
    cfg: ThermalConfig,
    heat: f64,
    stasis_heat: f64,
    momentum: f64,
    generation_rate: f64,
    dissipation_rate: f64,
    history: VecDeque<f64>,
    stability: f64,
}

impl ThermalModel {
    pub fn new(cfg: ThermalConfig) -> Self {
        ThermalModel {
            cfg,
            heat: 0.0,
            stasis_heat: 0.0,
            momentum: 0.0,
            generation_rate: 0.0,
            dissipation_rate: 0.0,
            history: VecDeque::with_capacity(STABILITY_WINDOW),
            stability: 1.0,
        }
    }

    pub fn heat(&self) -> f64 {
        self.heat
    }

    pub fn capacity(&self) -> f64 {
        self.cfg.capacity
    }

    pub fn stasis_heat(&self) -> f64 {
        self.stasis_heat
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn generation_rate(&self) -> f64 {
        self.generation_rate
    }

    pub fn dissipation_rate(&self) -> f64 {
        self.dissipation_rate
    }

    /// Heat relative to capacity; the zone classifier input.
    pub fn pressure(&self) -> f64 {
        (self.heat / self.cfg.capacity).clamp(0.0, 1.0)
    }

    pub fn detect_stasis(&self, coherence: f64, activity: f64, threshold: f64) -> bool {
        coherence > self.cfg.stasis_coherence && activity < threshold
    }

    pub fn update(&mut self, coherence: f64, activity: f64, alignment: f64) {
        if self.detect_stasis(coherence, activity, self.cfg.stasis_threshold) {
            self.generation_rate = self.cfg.generation_base * (1.0 + coherence);
            self.stasis_heat += self.generation_rate;
            tracing::debug!(stasis_heat = self.stasis_heat, "thermal.stasis");
        } else {
            self.generation_rate = 0.0;
        }
        self.dissipation_rate = self.cfg.dissipation_base * alignment;
        self.stasis_heat = (self.stasis_heat - self.dissipation_rate).max(0.0);
        if self.stasis_heat > 0.0 {
            self.add_heat(self.stasis_heat * self.cfg.stasis_fold);
        }
    }

    /// Adds heat amplified by current momentum; returns what actually landed.
    pub fn add_heat(&mut self, amount: f64) -> f64 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0.0;
        }
        let amplified = amount * (1.0 + self.momentum * 0.1).max(0.0);
        let before = self.heat;
        self.heat = (self.heat + amplified).min(self.cfg.capacity);
        self.momentum = self.momentum * 0.9 + amplified * 0.1;
        self.heat - before
    }

    pub fn remove_heat(&mut self, amount: f64) -> f64 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0.0;
        }
        let removal = amount.min(self.heat);
        self.heat -= removal;
        self.momentum = self.momentum * 0.9 - removal * 0.05;
        removal
    }

    pub fn scale_stasis_heat(&mut self, factor: f64) {
        self.stasis_heat = (self.stasis_heat * factor).max(0.0);
    }

    /// End-of-cycle regulation: passive cooling plus external pressure.
    pub fn settle(&mut self, pressure: f64) {
        let cooled = self.heat - self.cfg.cooling_rate * self.heat;
        let next = cooled + self.cfg.pressure_gain * pressure;
        self.heat = clamp_logged("heat", next, 0.0, self.cfg.capacity);
        self.momentum *= 0.95;
        if self.history.len() == STABILITY_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(self.heat);
        self.stability = self.compute_stability();
    }

    pub fn stability_index(&self) -> f64 {
        self.stability
    }

    fn compute_stability(&self) -> f64 {
        if self.history.len() < STABILITY_WINDOW {
            return 1.0;
        }
        let (lo, hi) = self
            .history
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), h| (lo.min(*h), hi.max(*h)));
        let fluctuation = (hi - lo) / self.cfg.capacity.max(f64::EPSILON);
        (1.0 - fluctuation).clamp(0.0, 1.0)
    }

    #[cfg(test)]
    pub(crate) fn force(&mut self, heat: f64, stasis_heat: f64) {
        self.heat = heat;
        self.stasis_heat = stasis_heat;
    }
}
