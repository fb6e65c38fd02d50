use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Zone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub base_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    /// Sensitivity to activity.
    pub alpha: f64,
    /// Sensitivity to external pressure.
    pub beta: f64,
    /// Sensitivity to mood pressure.
    pub gamma: f64,
    /// Sensitivity to combined tension.
    pub delta: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        IntervalConfig {
            base_ms: 1_000,
            min_ms: 100,
            max_ms: 5_000,
            alpha: 0.2,
            beta: 0.4,
            gamma: 0.3,
            delta: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalInputs {
    pub activity: f64,
    pub pressure: f64,
    pub mood_pressure: f64,
    pub stasis_heat: f64,
    pub drift_magnitude: f64,
    pub cascade_risk: f64,
    pub thermal_momentum: f64,
    pub stability: f64,
    pub zone: Zone,
    pub coherence: f64,
    pub heat: f64,
    pub capacity: f64,
}

impl IntervalInputs {
    pub fn tension(&self) -> f64 {
        0.2 * self.stasis_heat + 0.3 * self.drift_magnitude + 0.5 * self.cascade_risk
    }

    fn is_finite(&self) -> bool {
        [
            self.activity,
            self.pressure,
            self.mood_pressure,
            self.stasis_heat,
            self.drift_magnitude,
            self.cascade_risk,
            self.thermal_momentum,
            self.stability,
            self.coherence,
            self.heat,
            self.capacity,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

impl IntervalConfig {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// Next sleep between cycles, always within `[min_ms, max_ms]`. Any
    /// non-finite input yields the base interval.
    pub fn compute(&self, inputs: &IntervalInputs) -> Duration {
        if !inputs.is_finite() {
            return self.fallback();
        }
        let denom = 1.0
            + self.alpha * inputs.activity
            + self.beta * inputs.pressure
            + self.gamma * inputs.mood_pressure
            + self.delta * inputs.tension();
        if !denom.is_finite() || denom <= 0.0 {
            return self.fallback();
        }
        let mut secs = self.base_ms as f64 / 1_000.0 / denom;
        secs /= (1.0 + inputs.thermal_momentum * 0.1).max(0.1);
        secs *= 0.8 + 0.4 * inputs.stability.clamp(0.0, 1.0);
        secs *= zone_multiplier(inputs);
        if !secs.is_finite() {
            return self.fallback();
        }

        let lo = self.min_ms as f64 / 1_000.0;
        let hi = self.max_ms as f64 / 1_000.0;
        Duration::from_secs_f64(secs.clamp(lo, hi))
    }

    fn fallback(&self) -> Duration {
        self.base()
            .clamp(Duration::from_millis(self.min_ms), Duration::from_millis(self.max_ms))
    }
}

fn zone_multiplier(inputs: &IntervalInputs) -> f64 {
    match inputs.zone {
        Zone::Surge if inputs.coherence < 0.4 => 0.3,
        Zone::Surge => 0.5,
        Zone::Calm if inputs.coherence > 0.7 => 1.5,
        Zone::Calm => 1.2,
        Zone::Active if inputs.heat > 0.6 * inputs.capacity => 0.8,
        Zone::Active => 1.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle() -> IntervalInputs {
        IntervalInputs {
            activity: 0.0,
            pressure: 0.0,
            mood_pressure: 0.0,
            stasis_heat: 0.0,
            drift_magnitude: 0.0,
            cascade_risk: 0.0,
            thermal_momentum: 0.0,
            stability: 0.5,
            zone: Zone::Active,
            coherence: 0.5,
            heat: 0.0,
            capacity: 1.0,
        }
    }

    #[test]
    fn idle_active_interval_matches_closed_form() {
        let cfg = IntervalConfig::default();
        let interval = cfg.compute(&idle());
        assert!((interval.as_secs_f64() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn load_shortens_the_interval() {
        let cfg = IntervalConfig::default();
        let quiet = cfg.compute(&idle());
        let busy = cfg.compute(&IntervalInputs {
            activity: 1.0,
            pressure: 1.0,
            mood_pressure: 1.0,
            cascade_risk: 1.0,
            ..idle()
        });
        assert!(busy < quiet);
    }

    #[test]
    fn zone_multipliers_follow_coherence_and_heat() {
        let cfg = IntervalConfig::default();
        let surge_low = cfg.compute(&IntervalInputs {
            zone: Zone::Surge,
            coherence: 0.2,
            ..idle()
        });
        let surge_high = cfg.compute(&IntervalInputs {
            zone: Zone::Surge,
            coherence: 0.6,
            ..idle()
        });
        assert!(surge_low < surge_high);
        let calm_high = cfg.compute(&IntervalInputs {
            zone: Zone::Calm,
            coherence: 0.9,
            ..idle()
        });
        assert!((calm_high.as_secs_f64() - 1.5).abs() < 1e-9);
        let hot_active = cfg.compute(&IntervalInputs {
            heat: 0.7,
            ..idle()
        });
        assert!((hot_active.as_secs_f64() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn result_is_always_within_bounds() {
        let cfg = IntervalConfig::default();
        let floor = cfg.compute(&IntervalInputs {
            activity: 1.0,
            pressure: 1.0,
            mood_pressure: 1.0,
            stasis_heat: 50.0,
            drift_magnitude: 50.0,
            cascade_risk: 50.0,
            thermal_momentum: 5.0,
            stability: 0.0,
            zone: Zone::Surge,
            coherence: 0.1,
            ..idle()
        });
        assert_eq!(floor, Duration::from_millis(100));
        let ceiling = IntervalConfig {
            base_ms: 60_000,
            ..IntervalConfig::default()
        }
        .compute(&idle());
        assert_eq!(ceiling, Duration::from_millis(5_000));
    }

    #[test]
    fn non_finite_inputs_fall_back_to_base() {
        let cfg = IntervalConfig::default();
        for inputs in [
            IntervalInputs {
                activity: f64::NAN,
                ..idle()
            },
            IntervalInputs {
                thermal_momentum: f64::NAN,
                ..idle()
            },
            IntervalInputs {
                cascade_risk: f64::INFINITY,
                ..idle()
            },
        ] {
            assert_eq!(cfg.compute(&inputs), Duration::from_millis(1_000));
        }
        let wide = IntervalConfig {
            base_ms: 60_000,
            ..IntervalConfig::default()
        };
        let nan = wide.compute(&IntervalInputs {
            stability: f64::NAN,
            ..idle()
        });
        assert_eq!(nan, Duration::from_millis(5_000));
    }
}
