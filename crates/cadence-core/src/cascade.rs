use serde::{Deserialize, Serialize};

use crate::reflex::{Cooldowns, ReflexKind};
use crate::thermal::ThermalModel;
use crate::types::Tick;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub heat_weight: f64,
    pub entropy_weight: f64,
    pub drift_weight: f64,
    pub critical: f64,
    pub cooldown: u64,
    /// Share of the shared heat pool removed by one damping action.
    pub heat_cut: f64,
    /// Consecutive critical cycles after damping before an operator alert.
    pub escalation_cycles: u64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        CascadeConfig {
            heat_weight: 0.4,
            entropy_weight: 0.3,
            drift_weight: 0.3,
            critical: 0.8,
            cooldown: 50,
            heat_cut: 0.3,
            escalation_cycles: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CascadeOutcome {
    Nominal,
    Critical,
    Damped { heat_removed: f64 },
    /// Damping has not pulled risk under the threshold for `cycles` cycles.
    Escalated { cycles: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeReport {
    pub risk: f64,
    pub outcome: CascadeOutcome,
}

#[derive(Debug, Clone)]
pub struct CascadeRiskMonitor {
    cfg: CascadeConfig,
    cooldowns: Cooldowns,
    critical_streak: u64,
    escalated: bool,
}

impl CascadeRiskMonitor {
    pub fn new(cfg: CascadeConfig) -> Self {
        CascadeRiskMonitor {
            cfg,
            cooldowns: Cooldowns::default(),
            critical_streak: 0,
            escalated: false,
        }
    }

    pub fn cooldowns(&self) -> &Cooldowns {
        &self.cooldowns
    }

    pub fn risk(&self, stasis_heat: f64, entropy: f64, drift_magnitude: f64) -> f64 {
        let risk = self.cfg.heat_weight * stasis_heat
            + self.cfg.entropy_weight * entropy
            + self.cfg.drift_weight * drift_magnitude;
        risk.max(0.0)
    }

    pub fn evaluate(
        &mut self,
        tick: Tick,
        thermal: &mut ThermalModel,
        entropy: f64,
        drift_magnitude: f64,
    ) -> CascadeReport {
        let risk = self.risk(thermal.stasis_heat(), entropy, drift_magnitude);
        if risk <= self.cfg.critical {
            if self.critical_streak > 0 {
                tracing::info!(tick, risk, "cascade.cleared");
            }
            self.critical_streak = 0;
            self.escalated = false;
            return CascadeReport {
                risk,
                outcome: CascadeOutcome::Nominal,
            };
        }

        self.critical_streak = self.critical_streak.saturating_add(1);
        if self
            .cooldowns
            .try_fire(ReflexKind::CascadeDamping, tick, self.cfg.cooldown)
        {
            let heat_removed = thermal.remove_heat(thermal.heat() * self.cfg.heat_cut);
            thermal.scale_stasis_heat(0.5);
            tracing::warn!(tick, risk, heat_removed, "cascade.damped");
            return CascadeReport {
                risk,
                outcome: CascadeOutcome::Damped { heat_removed },
            };
        }

        let damped_before = self.cooldowns.last_fired(ReflexKind::CascadeDamping).is_some();
        if damped_before && !self.escalated && self.critical_streak > self.cfg.escalation_cycles {
            self.escalated = true;
            tracing::error!(tick, risk, cycles = self.critical_streak, "cascade.unresolved");
            return CascadeReport {
                risk,
                outcome: CascadeOutcome::Escalated {
                    cycles: self.critical_streak,
                },
            };
        }
        CascadeReport {
            risk,
            outcome: CascadeOutcome::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermal::ThermalConfig;

    #[test]
    fn risk_is_weighted_sum() {
        let monitor = CascadeRiskMonitor::new(CascadeConfig::default());
        let risk = monitor.risk(1.0, 0.5, 0.5);
        assert!((risk - (0.4 + 0.15 + 0.15)).abs() < 1e-12);
    }

    #[test]
    fn damping_cuts_heat_and_halves_stasis() {
        let mut monitor = CascadeRiskMonitor::new(CascadeConfig::default());
        let mut thermal = ThermalModel::new(ThermalConfig::default());
        thermal.force(1.0, 2.0);
        let report = monitor.evaluate(7, &mut thermal, 1.0, 0.0);
        assert!(matches!(report.outcome, CascadeOutcome::Damped { .. }));
        assert!((thermal.heat() - 0.7).abs() < 1e-9);
        assert!((thermal.stasis_heat() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn one_damping_per_cooldown_window_under_persistent_risk() {
        let mut monitor = CascadeRiskMonitor::new(CascadeConfig::default());
        let mut thermal = ThermalModel::new(ThermalConfig::default());
        let mut damped = 0;
        let mut escalations = 0;
        for tick in 1..=50 {
            thermal.force(1.0, 3.0);
            match monitor.evaluate(tick, &mut thermal, 1.0, 0.0).outcome {
                CascadeOutcome::Damped { .. } => damped += 1,
                CascadeOutcome::Escalated { .. } => escalations += 1,
                _ => {}
            }
        }
        assert_eq!(damped, 1);
        assert_eq!(escalations, 1);
    }

    #[test]
    fn low_risk_is_nominal_and_resets_episode() {
        let mut monitor = CascadeRiskMonitor::new(CascadeConfig::default());
        let mut thermal = ThermalModel::new(ThermalConfig::default());
        thermal.force(0.5, 3.0);
        monitor.evaluate(1, &mut thermal, 1.0, 0.0);
        thermal.force(0.1, 0.0);
        let report = monitor.evaluate(2, &mut thermal, 0.1, 0.0);
        assert_eq!(report.outcome, CascadeOutcome::Nominal);
    }
}
