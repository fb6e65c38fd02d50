use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub type Tick = u64;

/// Pressure classification, ordered from least to most pressure.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    #[default]
    Calm,
    Active,
    Surge,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Calm, Zone::Active, Zone::Surge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Calm => "calm",
            Zone::Active => "active",
            Zone::Surge => "surge",
        }
    }

    fn index(self) -> usize {
        match self {
            Zone::Calm => 0,
            Zone::Active => 1,
            Zone::Surge => 2,
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Zone {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "calm" => Ok(Zone::Calm),
            "active" => Ok(Zone::Active),
            "surge" => Ok(Zone::Surge),
            other => Err(format!("unknown zone: {other}")),
        }
    }
}

/// Ticks spent in each zone since it was last entered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoneTimers([u64; 3]);

impl ZoneTimers {
    pub fn get(&self, zone: Zone) -> u64 {
        self.0[zone.index()]
    }

    pub fn increment(&mut self, zone: Zone) {
        let slot = &mut self.0[zone.index()];
        *slot = slot.saturating_add(1);
    }

    pub fn reset(&mut self, zone: Zone) {
        self.0[zone.index()] = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Zone, u64)> + '_ {
        Zone::ALL.iter().map(move |zone| (*zone, self.get(*zone)))
    }
}

/// One reading from every sensor channel, already clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Signals {
    pub activity: f64,
    pub pressure: f64,
    pub mood_pressure: f64,
    pub entropy: f64,
}

impl Default for Signals {
    fn default() -> Self {
        Signals {
            activity: 0.5,
            pressure: 0.0,
            mood_pressure: 0.5,
            entropy: 0.5,
        }
    }
}

/// Mutable loop state. Owned by the scheduler; everything else sees a
/// [`CycleStateView`].
#[derive(Debug, Clone)]
pub struct CycleState {
    pub tick: Tick,
    pub coherence: f64,
    pub valence: f64,
    pub entropy: f64,
    pub arousal: f64,
    pub heat: f64,
    pub stasis_heat: f64,
    pub heat_generation_rate: f64,
    pub heat_dissipation_rate: f64,
    pub drift_vector: [f64; 3],
    pub drift_magnitude: f64,
    pub alignment: f64,
    pub cascade_risk: f64,
    pub zone: Zone,
    pub zone_timers: ZoneTimers,
    pub last_rebloom_tick: Tick,
    pub rebloom_count: u64,
    pub coherence_momentum: f64,
    pub previous_coherence: f64,
    pub tracer_urgency: f64,
    pub stability: f64,
    pub interval: Duration,
}

impl CycleState {
    pub fn new(base_interval: Duration) -> Self {
        CycleState {
            tick: 0,
            coherence: 1.0,
            valence: 0.0,
            entropy: 0.0,
            arousal: 0.0,
            heat: 0.0,
            stasis_heat: 0.0,
            heat_generation_rate: 0.0,
            heat_dissipation_rate: 0.0,
            drift_vector: [0.0; 3],
            drift_magnitude: 0.0,
            alignment: 1.0,
            cascade_risk: 0.0,
            zone: Zone::Calm,
            zone_timers: ZoneTimers::default(),
            last_rebloom_tick: 0,
            rebloom_count: 0,
            coherence_momentum: 0.0,
            previous_coherence: 1.0,
            tracer_urgency: 0.5,
            stability: 1.0,
            interval: base_interval,
        }
    }

    pub fn view(&self) -> CycleStateView {
        CycleStateView {
            tick: self.tick,
            coherence: self.coherence,
            valence: self.valence,
            entropy: self.entropy,
            arousal: self.arousal,
            heat: self.heat,
            stasis_heat: self.stasis_heat,
            drift_magnitude: self.drift_magnitude,
            alignment: self.alignment,
            cascade_risk: self.cascade_risk,
            zone: self.zone,
            zone_timers: self.zone_timers,
            rebloom_count: self.rebloom_count,
            last_rebloom_tick: self.last_rebloom_tick,
            coherence_momentum: self.coherence_momentum,
            tracer_urgency: self.tracer_urgency,
            stability: self.stability,
            interval_ms: self.interval.as_millis().min(u64::MAX as u128) as u64,
        }
    }
}

/// Read-only copy of [`CycleState`] handed to status surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStateView {
    pub tick: Tick,
    pub coherence: f64,
    pub valence: f64,
    pub entropy: f64,
    pub arousal: f64,
    pub heat: f64,
    pub stasis_heat: f64,
    pub drift_magnitude: f64,
    pub alignment: f64,
    pub cascade_risk: f64,
    pub zone: Zone,
    pub zone_timers: ZoneTimers,
    pub rebloom_count: u64,
    pub last_rebloom_tick: Tick,
    pub coherence_momentum: f64,
    pub tracer_urgency: f64,
    pub stability: f64,
    pub interval_ms: u64,
}

/// Wall-clock milliseconds since the Unix epoch; 0 if the clock is before it.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

/// Clamp `value` into `[lo, hi]`, logging when the clamp actually changed it.
/// NaN collapses to `lo`.
pub(crate) fn clamp_logged(name: &'static str, value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        tracing::warn!(field = name, "state.clamped_nan");
        return lo;
    }
    if value < lo || value > hi {
        tracing::warn!(field = name, value, lo, hi, "state.clamped");
    }
    value.clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_round_trips_through_str() {
        for zone in Zone::ALL {
            assert_eq!(zone.as_str().parse::<Zone>(), Ok(zone));
        }
        assert!("storm".parse::<Zone>().is_err());
    }

    #[test]
    fn zones_order_by_pressure() {
        assert!(Zone::Calm < Zone::Active);
        assert!(Zone::Active < Zone::Surge);
    }

    #[test]
    fn clamp_logged_handles_nan_and_bounds() {
        assert_eq!(clamp_logged("x", f64::NAN, 0.0, 1.0), 0.0);
        assert_eq!(clamp_logged("x", -0.5, 0.0, 1.0), 0.0);
        assert_eq!(clamp_logged("x", 1.5, 0.0, 1.0), 1.0);
        assert_eq!(clamp_logged("x", 0.4, 0.0, 1.0), 0.4);
    }
}
