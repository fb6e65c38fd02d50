use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cadence_core::{
    Alert, CycleHooks, CycleStateView, Intervention, RebloomCandidate, RebloomPriorityQueue,
    ReflexFire, Scheduler, SchedulerConfig, StopHandle, Tick, Zone,
};
use cadence_sensor::HostSensors;
use cadence_store::StateFile;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};

const MOODS: [&str; 6] = ["joyful", "curious", "calm", "neutral", "anxious", "drained"];

struct CliArgs {
    config: Option<PathBuf>,
    state: Option<PathBuf>,
    ticks: Option<u64>,
    demo_seeds: usize,
    rng_seed: u64,
    dump_config: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut parsed = CliArgs {
        config: None,
        state: None,
        ticks: None,
        demo_seeds: 0,
        rng_seed: 42,
        dump_config: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    return Err(anyhow!("--config requires a path"));
                };
                parsed.config = Some(PathBuf::from(path));
            }
            "--state" => {
                let Some(path) = args.next() else {
                    return Err(anyhow!("--state requires a path"));
                };
                parsed.state = Some(PathBuf::from(path));
            }
            "--ticks" => {
                let Some(value) = args.next() else {
                    return Err(anyhow!("--ticks requires a number"));
                };
                let ticks = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("--ticks expects a number, got {value}"))?;
                if ticks == 0 {
                    return Err(anyhow!("--ticks must be greater than zero"));
                }
                parsed.ticks = Some(ticks);
            }
            "--demo-seeds" => {
                let Some(value) = args.next() else {
                    return Err(anyhow!("--demo-seeds requires a number"));
                };
                parsed.demo_seeds = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("--demo-seeds expects a number, got {value}"))?;
            }
            "--rng-seed" => {
                let Some(value) = args.next() else {
                    return Err(anyhow!("--rng-seed requires a number"));
                };
                parsed.rng_seed = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("--rng-seed expects a number, got {value}"))?;
            }
            "--dump-config" => parsed.dump_config = true,
            other => return Err(anyhow!("unknown argument: {other}")),
        }
    }
    Ok(parsed)
}

fn load_config(path: Option<&PathBuf>) -> Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read config {path:?}"))?;
    SchedulerConfig::from_json(&raw).with_context(|| format!("invalid config {path:?}"))
}

/// Logs what the cycle reports and treats every handed-off candidate as done.
struct LogHooks {
    queue: RebloomPriorityQueue,
}

impl CycleHooks for LogHooks {
    fn on_tick(&mut self, tick: Tick, zone: Zone, heat: f64) {
        if tick % 10 == 0 {
            info!(tick, zone = zone.as_str(), heat, queued = self.queue.len(), "cadence.tick");
        }
    }

    fn on_reflex(&mut self, fire: &ReflexFire) {
        info!(tick = fire.tick, reflex = fire.reflex.as_str(), "cadence.reflex");
    }

    fn synthesize(&mut self, state: &CycleStateView) {
        info!(tick = state.tick, coherence = state.coherence, "cadence.synthesize");
    }

    fn diagnostic_scan(&mut self, state: &CycleStateView) {
        info!(
            tick = state.tick,
            heat = state.heat,
            drift = state.drift_magnitude,
            cascade_risk = state.cascade_risk,
            "cadence.diagnostic_scan"
        );
    }

    fn rebloom(&mut self, candidate: RebloomCandidate) -> bool {
        info!(
            seed = %candidate.seed_id,
            generation = candidate.generation,
            tag = candidate.rebloom_tag.as_deref().unwrap_or(""),
            "cadence.rebloom"
        );
        self.queue.mark_success(&candidate.seed_id);
        true
    }

    fn apply_penalty(&mut self, target: &str, weight: f64) {
        warn!(stress_target = target, weight, "cadence.penalty");
    }

    fn needs_intervention(&mut self, intervention: &Intervention) {
        error!(
            tick = intervention.tick,
            coherence = intervention.coherence,
            "cadence.intervention"
        );
    }

    fn alert(&mut self, alert: &Alert) {
        match serde_json::to_string(alert) {
            Ok(json) => warn!(alert = %json, "cadence.alert"),
            Err(err) => warn!(error = %err, "cadence.alert_encode_failed"),
        }
    }
}

/// Feeds random candidates from a small pool of seeds until stopped.
async fn run_demo_producer(
    queue: RebloomPriorityQueue,
    stop: StopHandle,
    seeds: usize,
    rng_seed: u64,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
    while !stop.is_stopped() {
        let seed_id = format!("seed-{}", rng.gen_range(0..seeds));
        let mood = MOODS[rng.gen_range(0..MOODS.len())];
        let candidate = queue
            .candidate(seed_id, rng.gen_range(0.1..1.0), rng.gen_range(0.0..1.0))
            .with_reinforcement(rng.gen_range(0..6))
            .with_position(rng.gen_range(0..8), rng.gen_range(0..8))
            .with_moods([(mood, 1.0)]);
        if let Ok(tag) = queue.try_push(candidate) {
            info!(tag = %tag, queued = queue.len(), "demo.pushed");
        }
        let pause = rng.gen_range(500..3_000);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let args = parse_args()?;
    let cfg = load_config(args.config.as_ref())?;
    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let host = HostSensors::new(args.rng_seed);
    let mut scheduler = Scheduler::new(cfg, host.sampler_sensors())?;
    let queue = scheduler.queue();
    scheduler = scheduler.with_hooks(LogHooks {
        queue: queue.clone(),
    });
    if let Some(path) = &args.state {
        let store = StateFile::open(path)?;
        info!(path = ?store.path(), "cadence.state_file");
        scheduler = scheduler.with_journal(Arc::new(store));
    }

    let stop = scheduler.stop_handle();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("cadence.ctrl_c");
                ctrl_c.stop();
            }
            Err(err) => warn!(error = %err, "cadence.signal_failed"),
        }
    });

    if args.demo_seeds > 0 {
        tokio::spawn(run_demo_producer(
            queue.clone(),
            stop.clone(),
            args.demo_seeds,
            args.rng_seed,
        ));
    }

    scheduler.run_until(args.ticks).await;
    stop.stop();

    let report = serde_json::json!({
        "state": scheduler.get_state_snapshot(),
        "stats": scheduler.engine_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
