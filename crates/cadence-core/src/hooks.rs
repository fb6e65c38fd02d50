use serde::{Deserialize, Serialize};

use crate::candidate::RebloomCandidate;
use crate::reflex::ReflexFire;
use crate::types::{CycleStateView, Tick, Zone};

/// Operator-visible conditions raised from inside the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    CoherenceLow { tick: Tick, coherence: f64 },
    EntropySpike { tick: Tick, entropy: f64 },
    MoodHeatmap { tick: Tick, mood_pressure: f64 },
    Cascade { tick: Tick, risk: f64, cycles: u64 },
}

/// Raised by the emergency reflex when coherence is below the critical floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub tick: Tick,
    pub zone: Zone,
    pub coherence: f64,
}

/// Host callbacks invoked synchronously from the cycle. Everything defaults
/// to a no-op, except `rebloom`, which accepts the candidate.
pub trait CycleHooks: Send {
    fn on_tick(&mut self, _tick: Tick, _zone: Zone, _heat: f64) {}

    fn on_reflex(&mut self, _fire: &ReflexFire) {}

    fn synthesize(&mut self, _state: &CycleStateView) {}

    fn diagnostic_scan(&mut self, _state: &CycleStateView) {}

    /// Takes ownership of a popped candidate. Returning `false` declines it.
    fn rebloom(&mut self, _candidate: RebloomCandidate) -> bool {
        true
    }

    fn apply_penalty(&mut self, _target: &str, _weight: f64) {}

    fn needs_intervention(&mut self, _intervention: &Intervention) {}

    fn alert(&mut self, _alert: &Alert) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl CycleHooks for NoopHooks {}
