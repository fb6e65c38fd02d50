use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{Tick, Zone, ZoneTimers};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Pressure below this is Calm.
    pub calm_below: f64,
    /// Pressure below this (and at or above `calm_below`) is Active.
    pub active_below: f64,
    pub transition_log: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZoneConfig {
            calm_below: 0.36,
            active_below: 0.70,
            transition_log: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTransition {
    pub tick: Tick,
    pub from: Zone,
    pub to: Zone,
}

#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    cfg: ZoneConfig,
    zone: Zone,
    timers: ZoneTimers,
    transitions: VecDeque<ZoneTransition>,
}

impl ZoneClassifier {
    pub fn new(cfg: ZoneConfig) -> Self {
        let cap = cfg.transition_log.max(1);
        ZoneClassifier {
            cfg,
            zone: Zone::Calm,
            timers: ZoneTimers::default(),
            transitions: VecDeque::with_capacity(cap),
        }
    }

    pub fn classify(&self, pressure: f64) -> Zone {
        if pressure < self.cfg.calm_below {
            Zone::Calm
        } else if pressure < self.cfg.active_below {
            Zone::Active
        } else {
            Zone::Surge
        }
    }

    /// Classifies `pressure`, updating timers and the transition log.
    pub fn observe(&mut self, tick: Tick, pressure: f64) -> Option<ZoneTransition> {
        let next = self.classify(pressure);
        if next == self.zone {
            self.timers.increment(next);
            return None;
        }
        let transition = ZoneTransition {
            tick,
            from: self.zone,
            to: next,
        };
        self.timers.reset(self.zone);
        if self.transitions.len() >= self.cfg.transition_log.max(1) {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
        self.zone = next;
        tracing::info!(
            tick,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "zone.changed"
        );
        Some(transition)
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn timers(&self) -> ZoneTimers {
        self.timers
    }

    pub fn time_in(&self, zone: Zone) -> u64 {
        self.timers.get(zone)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &ZoneTransition> {
        self.transitions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_split_three_zones() {
        let zones = ZoneClassifier::new(ZoneConfig::default());
        assert_eq!(zones.classify(0.0), Zone::Calm);
        assert_eq!(zones.classify(0.359), Zone::Calm);
        assert_eq!(zones.classify(0.36), Zone::Active);
        assert_eq!(zones.classify(0.699), Zone::Active);
        assert_eq!(zones.classify(0.70), Zone::Surge);
    }

    #[test]
    fn pressure_sequence_records_two_transitions() {
        let mut zones = ZoneClassifier::new(ZoneConfig::default());
        for (tick, pressure) in [0.2, 0.2, 0.5, 0.5, 0.9].into_iter().enumerate() {
            zones.observe(tick as Tick + 1, pressure);
        }
        let log: Vec<_> = zones.transitions().copied().collect();
        assert_eq!(
            log,
            vec![
                ZoneTransition {
                    tick: 3,
                    from: Zone::Calm,
                    to: Zone::Active
                },
                ZoneTransition {
                    tick: 5,
                    from: Zone::Active,
                    to: Zone::Surge
                },
            ]
        );
        assert_eq!(zones.zone(), Zone::Surge);
        assert_eq!(zones.time_in(Zone::Calm), 0);
        assert_eq!(zones.time_in(Zone::Active), 0);
        assert_eq!(zones.time_in(Zone::Surge), 0);
    }

    #[test]
    fn staying_put_increments_only_current_timer() {
        let mut zones = ZoneClassifier::new(ZoneConfig::default());
        zones.observe(1, 0.5);
        for tick in 2..=4 {
            zones.observe(tick, 0.5);
        }
        assert_eq!(zones.time_in(Zone::Active), 3);
        assert_eq!(zones.time_in(Zone::Calm), 0);
    }

    #[test]
    fn transition_log_is_a_ring() {
        let cfg = ZoneConfig {
            transition_log: 4,
            ..ZoneConfig::default()
        };
        let mut zones = ZoneClassifier::new(cfg);
        for tick in 0..20u64 {
            let pressure = if tick % 2 == 0 { 0.9 } else { 0.1 };
            zones.observe(tick, pressure);
        }
        let log: Vec<_> = zones.transitions().collect();
        assert_eq!(log.len(), 4);
        assert_eq!(log.last().map(|t| t.tick), Some(19));
    }
}
