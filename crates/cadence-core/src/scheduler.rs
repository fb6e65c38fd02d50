use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;

use crate::cascade::{CascadeOutcome, CascadeRiskMonitor};
use crate::coherence::{CoherenceInputs, CoherenceScorer};
use crate::config::{ConfigError, SchedulerConfig};
use crate::drift::DriftModel;
use crate::hooks::{Alert, CycleHooks, Intervention, NoopHooks};
use crate::interval::IntervalInputs;
use crate::journal::{PersistedState, StateJournal};
use crate::queue::RebloomPriorityQueue;
use crate::reflex::{ReflexContext, ReflexDispatcher, ReflexFire, ReflexKind};
use crate::sampler::{SamplerSensors, SignalSampler};
use crate::stats::{
    EngineStats, ExperimentalState, ThermalProfile, Trend, RECENT_TRANSITIONS, TREND_LEN,
};
use crate::thermal::ThermalModel;
use crate::types::{now_ms, CycleState, CycleStateView, Signals, Tick};
use crate::zone::ZoneClassifier;

/// Flips the scheduler's stop flag from anywhere.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Drives the cycle: sample, regulate, classify, react, then sleep for an
/// interval derived from the resulting state.
pub struct Scheduler {
    cfg: SchedulerConfig,
    state: CycleState,
    sampler: SignalSampler,
    thermal: ThermalModel,
    drift: DriftModel,
    coherence: CoherenceScorer,
    zones: ZoneClassifier,
    reflexes: ReflexDispatcher,
    cascade: CascadeRiskMonitor,
    queue: RebloomPriorityQueue,
    hooks: Box<dyn CycleHooks>,
    journal: Option<Arc<dyn StateJournal>>,
    intervals: Trend<u64>,
    entropy_trend: Trend<f64>,
    coherence_trend: Trend<f64>,
    snapshot_tx: watch::Sender<CycleStateView>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(cfg: SchedulerConfig, sensors: SamplerSensors) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let state = CycleState::new(cfg.interval.base());
        let (snapshot_tx, _) = watch::channel(state.view());
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Scheduler {
            sampler: SignalSampler::new(sensors, cfg.sensor_timeout()),
            thermal: ThermalModel::new(cfg.thermal.clone()),
            drift: DriftModel::new(),
            coherence: CoherenceScorer::new(cfg.coherence.clone()),
            zones: ZoneClassifier::new(cfg.zone.clone()),
            reflexes: ReflexDispatcher::new(cfg.reflex.clone()),
            cascade: CascadeRiskMonitor::new(cfg.cascade.clone()),
            queue: RebloomPriorityQueue::new(cfg.queue.clone()),
            hooks: Box::new(NoopHooks),
            journal: None,
            intervals: Trend::new(TREND_LEN),
            entropy_trend: Trend::new(TREND_LEN),
            coherence_trend: Trend::new(TREND_LEN),
            snapshot_tx,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            state,
            cfg,
        })
    }

    /// Shares an existing queue instead of the one built from config.
    pub fn with_queue(mut self, queue: RebloomPriorityQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_hooks(mut self, hooks: impl CycleHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Attaches a journal and resumes `tick` and `rebloom_count` from it.
    pub fn with_journal(mut self, journal: Arc<dyn StateJournal>) -> Self {
        if let Some(saved) = journal.restore() {
            self.state.tick = saved.tick;
            self.state.rebloom_count = saved.rebloom_count;
            tracing::info!(
                tick = saved.tick,
                rebloom_count = saved.rebloom_count,
                "scheduler.restored"
            );
            self.publish();
        }
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn queue(&self) -> RebloomPriorityQueue {
        self.queue.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn get_state_snapshot(&self) -> CycleStateView {
        self.state.view()
    }

    pub fn engine_stats(&self) -> EngineStats {
        let transitions: Vec<_> = self.zones.transitions().copied().collect();
        let recent = transitions.len().saturating_sub(RECENT_TRANSITIONS);
        let reflex_cooldowns: BTreeMap<String, Tick> = self
            .reflexes
            .cooldowns()
            .iter()
            .chain(self.cascade.cooldowns().iter())
            .map(|(kind, tick)| (kind.as_str().to_string(), tick))
            .collect();
        let state = &self.state;
        EngineStats {
            tick: state.tick,
            zone: state.zone,
            zone_timers: state.zone_timers,
            recent_intervals_ms: self.intervals.to_vec(),
            entropy_trend: self.entropy_trend.to_vec(),
            coherence_trend: self.coherence_trend.to_vec(),
            zone_transitions: transitions[recent..].to_vec(),
            reflex_cooldowns,
            queued: self.queue.len(),
            thermal: ThermalProfile {
                heat: self.thermal.heat(),
                capacity: self.thermal.capacity(),
                pressure: self.thermal.pressure(),
                momentum: self.thermal.momentum(),
                generation_rate: self.thermal.generation_rate(),
                dissipation_rate: self.thermal.dissipation_rate(),
                stability: state.stability,
            },
            experimental: ExperimentalState {
                stasis_heat: state.stasis_heat,
                drift_magnitude: state.drift_magnitude,
                cascade_risk: state.cascade_risk,
                rebloom_count: state.rebloom_count,
                tracer_urgency: state.tracer_urgency,
                alignment: state.alignment,
            },
        }
    }

    /// Receives a fresh view after every cycle.
    pub fn watch(&self) -> watch::Receiver<CycleStateView> {
        self.snapshot_tx.subscribe()
    }

    pub async fn run(&mut self) {
        self.run_until(None).await
    }

    /// Runs until stopped or until `max_ticks` more cycles have completed.
    /// Final state is persisted on the way out.
    pub async fn run_until(&mut self, max_ticks: Option<u64>) {
        let mut stop = self.stop_rx.clone();
        let started = self.state.tick;
        tracing::info!(tick = started, "scheduler.started");
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            let interval = self.run_cycle().await;
            let done = max_ticks
                .map(|limit| self.state.tick.saturating_sub(started) >= limit)
                .unwrap_or(false);
            if done {
                break;
            }
            tokio::select! {
                _ = sleep(interval) => {}
                _ = stop.changed() => {}
            }
        }
        self.persist();
        tracing::info!(
            tick = self.state.tick,
            rebloom_count = self.state.rebloom_count,
            "scheduler.stopped"
        );
    }

    /// One full cycle; returns the interval to sleep before the next.
    pub async fn run_cycle(&mut self) -> Duration {
        self.state.tick += 1;
        let tick = self.state.tick;
        let signals = self.sampler.sample().await;
        self.absorb(&signals);

        self.thermal
            .update(self.state.coherence, signals.activity, self.state.alignment);

        self.drift.update(
            self.state.valence,
            self.state.arousal,
            self.state.entropy,
            self.cfg.drift.decay_rate,
            self.cfg.drift.arousal_factor,
        );
        self.state.drift_vector = self.drift.vector();
        self.state.drift_magnitude = self.drift.magnitude();
        self.state.alignment = self.drift.next_alignment(self.state.alignment, &self.cfg.drift);

        self.score_coherence();

        self.zones.observe(tick, self.thermal.pressure());
        self.state.zone = self.zones.zone();
        self.state.zone_timers = self.zones.timers();

        let fires = self.reflexes.maybe_fire(&ReflexContext {
            tick,
            zone: self.state.zone,
            zone_time: self.zones.time_in(self.state.zone),
            coherence: self.state.coherence,
            entropy: self.state.entropy,
            valence: self.state.valence,
            mood_pressure: signals.mood_pressure,
        });
        for fire in fires {
            self.fire(&fire);
        }

        let report = self.cascade.evaluate(
            tick,
            &mut self.thermal,
            self.state.entropy,
            self.state.drift_magnitude,
        );
        self.state.cascade_risk = report.risk;
        match report.outcome {
            CascadeOutcome::Damped { .. } => self.fire(&ReflexFire {
                reflex: ReflexKind::CascadeDamping,
                tick,
                zone: self.state.zone,
            }),
            CascadeOutcome::Escalated { cycles } => self.hooks.alert(&Alert::Cascade {
                tick,
                risk: report.risk,
                cycles,
            }),
            CascadeOutcome::Nominal | CascadeOutcome::Critical => {}
        }

        self.thermal.settle(signals.pressure);
        self.sync_thermal();

        let interval = self.cfg.interval.compute(&IntervalInputs {
            activity: signals.activity,
            pressure: signals.pressure,
            mood_pressure: signals.mood_pressure,
            stasis_heat: self.state.stasis_heat,
            drift_magnitude: self.state.drift_magnitude,
            cascade_risk: self.state.cascade_risk,
            thermal_momentum: self.thermal.momentum(),
            stability: self.state.stability,
            zone: self.state.zone,
            coherence: self.state.coherence,
            heat: self.state.heat,
            capacity: self.thermal.capacity(),
        });
        self.state.interval = interval;
        self.intervals.push(interval.as_millis().min(u64::MAX as u128) as u64);
        self.entropy_trend.push(self.state.entropy);
        self.coherence_trend.push(self.state.coherence);
        tracing::debug!(
            tick,
            zone = self.state.zone.as_str(),
            heat = self.state.heat,
            coherence = self.state.coherence,
            interval_ms = interval.as_millis() as u64,
            "scheduler.tick"
        );

        let every = self.cfg.persist_every;
        if every > 0 && tick % every == 0 {
            self.persist();
        }
        self.hooks.on_tick(tick, self.state.zone, self.state.heat);
        self.publish();
        interval
    }

    fn absorb(&mut self, signals: &Signals) {
        self.state.arousal = signals.activity;
        self.state.valence = (2.0 * signals.mood_pressure - 1.0).clamp(-1.0, 1.0);
        self.state.entropy = signals.entropy;
    }

    fn score_coherence(&mut self) {
        let previous = self.state.coherence;
        let coherence = self.coherence.compute(
            CoherenceInputs {
                alignment: self.state.alignment,
                heat_pressure: self.thermal.pressure(),
                urgency: self.state.tracer_urgency,
                entropy: self.state.entropy,
            },
            self.state.coherence_momentum,
        );
        let step = self
            .coherence
            .momentum_step(coherence, previous, self.state.tracer_urgency);
        self.state.previous_coherence = previous;
        self.state.coherence = coherence;
        self.state.coherence_momentum = step.momentum;
        self.state.tracer_urgency = step.tracer_urgency;
    }

    fn sync_thermal(&mut self) {
        self.state.heat = self.thermal.heat().max(0.0);
        self.state.stasis_heat = self.thermal.stasis_heat();
        self.state.heat_generation_rate = self.thermal.generation_rate();
        self.state.heat_dissipation_rate = self.thermal.dissipation_rate();
        self.state.stability = self.thermal.stability_index();
    }

    fn fire(&mut self, fire: &ReflexFire) {
        self.apply_reflex(fire);
        self.hooks.on_reflex(fire);
    }

    fn apply_reflex(&mut self, fire: &ReflexFire) {
        match fire.reflex {
            ReflexKind::Synthesis => {
                let view = self.state.view();
                self.hooks.synthesize(&view);
            }
            ReflexKind::DiagnosticScan => {
                let view = self.state.view();
                self.hooks.diagnostic_scan(&view);
            }
            ReflexKind::QueueDrain => {
                self.hand_off(fire.tick);
            }
            ReflexKind::Rebloom => {
                if self.hand_off(fire.tick) {
                    self.state.arousal = (self.state.arousal * 1.1).min(1.0);
                    self.state.entropy *= 0.9;
                }
            }
            ReflexKind::EmergencyResponse => {
                let reflex = self.reflexes.config();
                for target in &reflex.stress_targets {
                    self.hooks.apply_penalty(target, reflex.penalty_weight);
                }
                if self.state.coherence < reflex.critical_coherence {
                    tracing::warn!(
                        tick = fire.tick,
                        coherence = self.state.coherence,
                        "scheduler.intervention"
                    );
                    self.hooks.needs_intervention(&Intervention {
                        tick: fire.tick,
                        zone: fire.zone,
                        coherence: self.state.coherence,
                    });
                }
            }
            ReflexKind::CoherenceAlert => {
                self.hooks.alert(&Alert::CoherenceLow {
                    tick: fire.tick,
                    coherence: self.state.coherence,
                });
            }
            ReflexKind::EntropySpike => {
                self.hooks.alert(&Alert::EntropySpike {
                    tick: fire.tick,
                    entropy: self.state.entropy,
                });
            }
            ReflexKind::MoodHeatmap => {
                self.hooks.alert(&Alert::MoodHeatmap {
                    tick: fire.tick,
                    mood_pressure: (self.state.valence + 1.0) / 2.0,
                });
            }
            ReflexKind::CascadeDamping => {
                self.sync_thermal();
            }
        }
    }

    /// Pops the best candidate and offers it to the host. True when accepted.
    fn hand_off(&mut self, tick: Tick) -> bool {
        let Some(candidate) = self.queue.pop() else {
            return false;
        };
        let seed = candidate.seed_id.clone();
        if !self.hooks.rebloom(candidate) {
            tracing::info!(tick, seed = %seed, "rebloom.declined");
            return false;
        }
        self.state.rebloom_count += 1;
        self.state.last_rebloom_tick = tick;
        tracing::info!(
            tick,
            seed = %seed,
            rebloom_count = self.state.rebloom_count,
            "rebloom.accepted"
        );
        true
    }

    fn persist(&self) {
        if let Some(journal) = &self.journal {
            journal.persist(&PersistedState::capture(&self.state.view(), now_ms()));
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.view());
    }
}
