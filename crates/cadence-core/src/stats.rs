use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{Tick, Zone, ZoneTimers};
use crate::zone::ZoneTransition;

/// Samples kept per trend in [`EngineStats`].
pub const TREND_LEN: usize = 10;
/// Zone transitions reported by [`EngineStats`].
pub const RECENT_TRANSITIONS: usize = 5;

/// The most recent `cap` values, oldest first.
#[derive(Debug, Clone)]
pub(crate) struct Trend<T> {
    cap: usize,
    values: VecDeque<T>,
}

impl<T: Copy> Trend<T> {
    pub(crate) fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Trend {
            cap,
            values: VecDeque::with_capacity(cap),
        }
    }

    pub(crate) fn push(&mut self, value: T) {
        if self.values.len() == self.cap {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub(crate) fn to_vec(&self) -> Vec<T> {
        self.values.iter().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalProfile {
    pub heat: f64,
    pub capacity: f64,
    pub pressure: f64,
    pub momentum: f64,
    pub generation_rate: f64,
    pub dissipation_rate: f64,
    pub stability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalState {
    pub stasis_heat: f64,
    pub drift_magnitude: f64,
    pub cascade_risk: f64,
    pub rebloom_count: u64,
    pub tracer_urgency: f64,
    pub alignment: f64,
}

/// Point-in-time diagnostics: recent trends, the tail of the zone log and
/// the last tick each reflex fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub tick: Tick,
    pub zone: Zone,
    pub zone_timers: ZoneTimers,
    pub recent_intervals_ms: Vec<u64>,
    pub entropy_trend: Vec<f64>,
    pub coherence_trend: Vec<f64>,
    pub zone_transitions: Vec<ZoneTransition>,
    pub reflex_cooldowns: BTreeMap<String, Tick>,
    pub queued: usize,
    pub thermal: ThermalProfile,
    pub experimental: ExperimentalState,
}
