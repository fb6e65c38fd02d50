use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cascade::CascadeConfig;
use crate::coherence::CoherenceConfig;
use crate::drift::DriftConfig;
use crate::interval::IntervalConfig;
use crate::queue::QueueConfig;
use crate::reflex::ReflexConfig;
use crate::thermal::ThermalConfig;
use crate::zone::ZoneConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(String),
    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },
    #[error("min interval {min_ms}ms exceeds max interval {max_ms}ms")]
    InvertedBounds { min_ms: u64, max_ms: u64 },
    #[error("zone thresholds out of order: calm_below {calm} must be under active_below {active}")]
    ZoneOrder { calm: f64, active: f64 },
    #[error("{field} must be a finite, non-negative number (got {value})")]
    BadNumber { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval: IntervalConfig,
    pub thermal: ThermalConfig,
    pub drift: DriftConfig,
    pub coherence: CoherenceConfig,
    pub zone: ZoneConfig,
    pub reflex: ReflexConfig,
    pub cascade: CascadeConfig,
    pub queue: QueueConfig,
    pub sensor_timeout_ms: u64,
    /// Persist every N ticks; 0 persists only on stop.
    pub persist_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            interval: IntervalConfig::default(),
            thermal: ThermalConfig::default(),
            drift: DriftConfig::default(),
            coherence: CoherenceConfig::default(),
            zone: ZoneConfig::default(),
            reflex: ReflexConfig::default(),
            cascade: CascadeConfig::default(),
            queue: QueueConfig::default(),
            sensor_timeout_ms: 250,
            persist_every: 1,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: SchedulerConfig =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = &self.interval;
        for (field, value) in [
            ("interval.base_ms", interval.base_ms),
            ("interval.min_ms", interval.min_ms),
            ("interval.max_ms", interval.max_ms),
            ("queue.ttl_ms", self.queue.ttl_ms),
            ("sensor_timeout_ms", self.sensor_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive { field });
            }
        }
        if interval.min_ms > interval.max_ms {
            return Err(ConfigError::InvertedBounds {
                min_ms: interval.min_ms,
                max_ms: interval.max_ms,
            });
        }
        if !(self.thermal.capacity.is_finite() && self.thermal.capacity > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "thermal.capacity",
            });
        }
        let zone = &self.zone;
        if !(zone.calm_below.is_finite() && zone.active_below.is_finite())
            || zone.calm_below >= zone.active_below
        {
            return Err(ConfigError::ZoneOrder {
                calm: zone.calm_below,
                active: zone.active_below,
            });
        }
        for (field, value) in self.numbers() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::BadNumber { field, value });
            }
        }
        let valence = self.reflex.rebloom_valence;
        if !valence.is_finite() {
            return Err(ConfigError::BadNumber {
                field: "reflex.rebloom_valence",
                value: valence,
            });
        }
        Ok(())
    }

    fn numbers(&self) -> [(&'static str, f64); 43] {
        let (i, t, d, c, r, k, q) = (
            &self.interval,
            &self.thermal,
            &self.drift,
            &self.coherence,
            &self.reflex,
            &self.cascade,
            &self.queue,
        );
        [
            ("interval.alpha", i.alpha),
            ("interval.beta", i.beta),
            ("interval.gamma", i.gamma),
            ("interval.delta", i.delta),
            ("thermal.generation_base", t.generation_base),
            ("thermal.dissipation_base", t.dissipation_base),
            ("thermal.stasis_threshold", t.stasis_threshold),
            ("thermal.stasis_coherence", t.stasis_coherence),
            ("thermal.stasis_fold", t.stasis_fold),
            ("thermal.cooling_rate", t.cooling_rate),
            ("thermal.pressure_gain", t.pressure_gain),
            ("drift.arousal_factor", d.arousal_factor),
            ("drift.decay_rate", d.decay_rate),
            ("drift.alignment_impact", d.alignment_impact),
            ("drift.recovery_rate", d.recovery_rate),
            ("coherence.alignment_weight", c.alignment_weight),
            ("coherence.pressure_weight", c.pressure_weight),
            ("coherence.urgency_weight", c.urgency_weight),
            ("coherence.entropy_weight", c.entropy_weight),
            ("coherence.momentum_weight", c.momentum_weight),
            ("coherence.momentum_threshold", c.momentum_threshold),
            ("reflex.penalty_weight", r.penalty_weight),
            ("reflex.critical_coherence", r.critical_coherence),
            ("reflex.rebloom_entropy", r.rebloom_entropy),
            ("reflex.alert_coherence", r.alert_coherence),
            ("reflex.entropy_spike", r.entropy_spike),
            ("reflex.mood_heatmap", r.mood_heatmap),
            ("cascade.heat_weight", k.heat_weight),
            ("cascade.entropy_weight", k.entropy_weight),
            ("cascade.drift_weight", k.drift_weight),
            ("cascade.critical", k.critical),
            ("cascade.heat_cut", k.heat_cut),
            ("queue.min_viable_score", q.min_viable_score),
            ("queue.trust_weight", q.trust_weight),
            ("queue.stability_weight", q.stability_weight),
            ("queue.reinforcement_weight", q.reinforcement_weight),
            ("queue.vitality_weight", q.vitality_weight),
            ("queue.generation_decay", q.generation_decay),
            ("queue.cluster_base", q.cluster_base),
            ("queue.cluster_step", q.cluster_step),
            ("queue.cluster_cap", q.cluster_cap),
            ("queue.failure_penalty", q.failure_penalty),
            ("queue.failure_recovery", q.failure_recovery),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SchedulerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = SchedulerConfig::from_json(
            r#"{"interval":{"base_ms":2000},"zone":{"calm_below":0.3},"persist_every":5}"#,
        )
        .expect("config");
        assert_eq!(cfg.interval.base_ms, 2_000);
        assert_eq!(cfg.interval.max_ms, 5_000);
        assert_eq!(cfg.zone.calm_below, 0.3);
        assert_eq!(cfg.zone.active_below, 0.70);
        assert_eq!(cfg.persist_every, 5);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut cfg = SchedulerConfig::default();
        cfg.zone.calm_below = 0.8;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZoneOrder { .. })));

        let mut cfg = SchedulerConfig::default();
        cfg.interval.min_ms = 6_000;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvertedBounds {
                min_ms: 6_000,
                max_ms: 5_000
            })
        );
    }

    #[test]
    fn zero_bounds_and_nan_weights_are_rejected() {
        let mut cfg = SchedulerConfig::default();
        cfg.interval.min_ms = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositive {
                field: "interval.min_ms"
            })
        );

        let mut cfg = SchedulerConfig::default();
        cfg.coherence.entropy_weight = f64::NAN;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadNumber {
                field: "coherence.entropy_weight",
                ..
            })
        ));
    }

    #[test]
    fn every_queue_and_reflex_weight_is_checked() {
        let mut cfg = SchedulerConfig::default();
        cfg.queue.reinforcement_weight = f64::NAN;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadNumber {
                field: "queue.reinforcement_weight",
                ..
            })
        ));

        let mut cfg = SchedulerConfig::default();
        cfg.queue.failure_recovery = -1.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadNumber {
                field: "queue.failure_recovery",
                ..
            })
        ));

        let mut cfg = SchedulerConfig::default();
        cfg.reflex.mood_heatmap = f64::INFINITY;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadNumber {
                field: "reflex.mood_heatmap",
                ..
            })
        ));

        let mut cfg = SchedulerConfig::default();
        cfg.reflex.rebloom_valence = -0.3;
        assert_eq!(cfg.validate(), Ok(()));
        cfg.reflex.rebloom_valence = f64::NAN;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadNumber {
                field: "reflex.rebloom_valence",
                ..
            })
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            SchedulerConfig::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }
}
