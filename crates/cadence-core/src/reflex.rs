use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Tick, Zone};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReflexKind {
    Synthesis,
    QueueDrain,
    DiagnosticScan,
    EmergencyResponse,
    Rebloom,
    CoherenceAlert,
    EntropySpike,
    MoodHeatmap,
    CascadeDamping,
}

impl ReflexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflexKind::Synthesis => "synthesis",
            ReflexKind::QueueDrain => "queue_drain",
            ReflexKind::DiagnosticScan => "diagnostic_scan",
            ReflexKind::EmergencyResponse => "emergency_response",
            ReflexKind::Rebloom => "rebloom",
            ReflexKind::CoherenceAlert => "coherence_alert",
            ReflexKind::EntropySpike => "entropy_spike",
            ReflexKind::MoodHeatmap => "mood_heatmap",
            ReflexKind::CascadeDamping => "cascade_damping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexConfig {
    pub synthesis_after: u64,
    pub synthesis_cooldown: u64,
    pub drain_after: u64,
    pub drain_cooldown: u64,
    pub scan_after: u64,
    pub scan_cooldown: u64,
    pub surge_after: u64,
    pub surge_cooldown: u64,
    pub stress_targets: Vec<String>,
    pub penalty_weight: f64,
    pub critical_coherence: f64,
    pub rebloom_entropy: f64,
    pub rebloom_valence: f64,
    pub rebloom_cooldown: u64,
    pub alert_coherence: f64,
    pub entropy_spike: f64,
    pub mood_heatmap: f64,
    pub alert_cooldown: u64,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        ReflexConfig {
            synthesis_after: 20,
            synthesis_cooldown: 50,
            drain_after: 15,
            drain_cooldown: 30,
            scan_after: 30,
            scan_cooldown: 25,
            surge_after: 10,
            surge_cooldown: 40,
            stress_targets: vec!["A1".into(), "C3".into(), "D4".into()],
            penalty_weight: 0.8,
            critical_coherence: 0.25,
            rebloom_entropy: 0.45,
            rebloom_valence: 0.2,
            rebloom_cooldown: 30,
            alert_coherence: 0.3,
            entropy_spike: 0.6,
            mood_heatmap: 0.5,
            alert_cooldown: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReflexFire {
    pub reflex: ReflexKind,
    pub tick: Tick,
    pub zone: Zone,
}

/// Last-fired tick per reflex. A reflex is ready again once strictly more
/// than its cooldown has elapsed.
#[derive(Debug, Clone, Default)]
pub struct Cooldowns {
    last_fired: HashMap<ReflexKind, Tick>,
}

impl Cooldowns {
    pub fn ready(&self, kind: ReflexKind, tick: Tick, cooldown: u64) -> bool {
        match self.last_fired.get(&kind) {
            Some(last) => tick.saturating_sub(*last) > cooldown,
            None => true,
        }
    }

    pub fn record(&mut self, kind: ReflexKind, tick: Tick) {
        self.last_fired.insert(kind, tick);
    }

    pub fn last_fired(&self, kind: ReflexKind) -> Option<Tick> {
        self.last_fired.get(&kind).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReflexKind, Tick)> + '_ {
        self.last_fired.iter().map(|(kind, tick)| (*kind, *tick))
    }

    /// Records and returns true when `kind` is off cooldown.
    pub fn try_fire(&mut self, kind: ReflexKind, tick: Tick, cooldown: u64) -> bool {
        if !self.ready(kind, tick, cooldown) {
            return false;
        }
        self.record(kind, tick);
        true
    }
}

/// What the dispatcher looks at when deciding which reflexes fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflexContext {
    pub tick: Tick,
    pub zone: Zone,
    /// Ticks spent in `zone` since entering it.
    pub zone_time: u64,
    pub coherence: f64,
    pub entropy: f64,
    pub valence: f64,
    pub mood_pressure: f64,
}

#[derive(Debug, Clone)]
pub struct ReflexDispatcher {
    cfg: ReflexConfig,
    cooldowns: Cooldowns,
}

impl ReflexDispatcher {
    pub fn new(cfg: ReflexConfig) -> Self {
        ReflexDispatcher {
            cfg,
            cooldowns: Cooldowns::default(),
        }
    }

    pub fn config(&self) -> &ReflexConfig {
        &self.cfg
    }

    pub fn cooldowns(&self) -> &Cooldowns {
        &self.cooldowns
    }

    /// Returns the reflexes whose condition holds and whose cooldown has
    /// elapsed, recording each as fired at `ctx.tick`.
    pub fn maybe_fire(&mut self, ctx: &ReflexContext) -> Vec<ReflexFire> {
        let cfg = &self.cfg;
        let mut due: Vec<(ReflexKind, u64)> = Vec::new();
        match ctx.zone {
            Zone::Calm => {
                if ctx.zone_time >= cfg.synthesis_after {
                    due.push((ReflexKind::Synthesis, cfg.synthesis_cooldown));
                }
                if ctx.zone_time >= cfg.drain_after {
                    due.push((ReflexKind::QueueDrain, cfg.drain_cooldown));
                }
            }
            Zone::Active => {
                if ctx.zone_time >= cfg.scan_after {
                    due.push((ReflexKind::DiagnosticScan, cfg.scan_cooldown));
                }
            }
            Zone::Surge => {
                if ctx.zone_time >= cfg.surge_after {
                    due.push((ReflexKind::EmergencyResponse, cfg.surge_cooldown));
                }
            }
        }
        if ctx.entropy > cfg.rebloom_entropy && ctx.valence < cfg.rebloom_valence {
            due.push((ReflexKind::Rebloom, cfg.rebloom_cooldown));
        }
        if ctx.coherence < cfg.alert_coherence {
            due.push((ReflexKind::CoherenceAlert, cfg.alert_cooldown));
        }
        if ctx.entropy > cfg.entropy_spike {
            due.push((ReflexKind::EntropySpike, cfg.alert_cooldown));
        }
        if ctx.mood_pressure > cfg.mood_heatmap {
            due.push((ReflexKind::MoodHeatmap, cfg.alert_cooldown));
        }

        let mut fired = Vec::new();
        for (kind, cooldown) in due {
            if self.cooldowns.try_fire(kind, ctx.tick, cooldown) {
                tracing::info!(
                    tick = ctx.tick,
                    reflex = kind.as_str(),
                    zone = ctx.zone.as_str(),
                    "reflex.fired"
                );
                fired.push(ReflexFire {
                    reflex: kind,
                    tick: ctx.tick,
                    zone: ctx.zone,
                });
            }
        }
        fired
    }
}
