use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use cadence_core::{SamplerSensors, Sensor};

const CPU_WINDOW: usize = 16;

struct HostState {
    system: System,
    rng: ChaCha8Rng,
    cpu: VecDeque<f64>,
    memory_pressure: f64,
}

impl HostState {
    fn refresh_cpu(&mut self) -> f64 {
        self.system.refresh_cpu_usage();
        let usage = (self.system.global_cpu_info().cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);
        if self.cpu.len() == CPU_WINDOW {
            self.cpu.pop_front();
        }
        self.cpu.push_back(usage);
        usage
    }

    fn refresh_memory(&mut self) -> f64 {
        self.system.refresh_memory();
        self.memory_pressure =
            memory_pressure(self.system.total_memory(), self.system.available_memory());
        self.memory_pressure
    }

    fn last_cpu(&self) -> f64 {
        self.cpu.back().copied().unwrap_or(0.0)
    }
}

/// Host-backed readings for every sampler channel. Clones share one
/// `sysinfo::System`.
#[derive(Clone)]
pub struct HostSensors {
    state: Arc<Mutex<HostState>>,
}

impl HostSensors {
    pub fn new(seed: u64) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        HostSensors {
            state: Arc::new(Mutex::new(HostState {
                system,
                rng: ChaCha8Rng::seed_from_u64(seed),
                cpu: VecDeque::with_capacity(CPU_WINDOW),
                memory_pressure: 0.0,
            })),
        }
    }

    /// Global CPU usage.
    pub fn activity(&self) -> f64 {
        self.state.lock().refresh_cpu()
    }

    /// Share of memory in use.
    pub fn pressure(&self) -> f64 {
        self.state.lock().refresh_memory()
    }

    /// Headroom left on the host, centred at 0.5 when half used.
    pub fn mood(&self) -> f64 {
        let state = self.state.lock();
        headroom(state.last_cpu(), state.memory_pressure)
    }

    /// CPU jitter over the recent window with a little seeded noise.
    pub fn entropy(&self) -> f64 {
        let mut state = self.state.lock();
        let noise = state.rng.gen_range(-0.05..0.05);
        let samples: Vec<f64> = state.cpu.iter().copied().collect();
        (jitter(&samples) + 0.2 + noise).clamp(0.0, 1.0)
    }

    pub fn sampler_sensors(&self) -> SamplerSensors {
        let activity = self.clone();
        let pressure = self.clone();
        let mood = self.clone();
        let entropy = self.clone();
        SamplerSensors {
            activity: Some(Sensor::blocking(move || Ok(activity.activity()))),
            pressure: Some(Sensor::blocking(move || Ok(pressure.pressure()))),
            mood: Some(Sensor::blocking(move || Ok(mood.mood()))),
            entropy: Some(Sensor::blocking(move || Ok(entropy.entropy()))),
        }
    }
}

pub fn memory_pressure(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let free = available.min(total) as f64 / total as f64;
    (1.0 - free).clamp(0.0, 1.0)
}

pub fn headroom(cpu: f64, memory_pressure: f64) -> f64 {
    (1.0 - 0.5 * (cpu + memory_pressure)).clamp(0.0, 1.0)
}

/// Standard deviation of `samples`, scaled so a 0/1 square wave reads 1.0.
pub fn jitter(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let (lo, hi) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(*s), hi.max(*s)));
    if hi - lo <= 0.0 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (variance.sqrt() * 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pressure_handles_edges() {
        assert_eq!(memory_pressure(0, 10), 0.0);
        assert_eq!(memory_pressure(100, 100), 0.0);
        assert_eq!(memory_pressure(100, 25), 0.75);
        assert_eq!(memory_pressure(100, 500), 0.0);
    }

    #[test]
    fn headroom_falls_with_load() {
        assert_eq!(headroom(0.0, 0.0), 1.0);
        assert_eq!(headroom(0.5, 0.5), 0.5);
        assert_eq!(headroom(1.0, 1.0), 0.0);
    }

    #[test]
    fn jitter_reads_steady_as_zero() {
        assert_eq!(jitter(&[]), 0.0);
        assert_eq!(jitter(&[0.4; 8]), 0.0);
        assert_eq!(jitter(&[0.1; 3]), 0.0);
        assert!(jitter(&[0.4, 0.4, 0.41]) > 0.0);
        assert!((jitter(&[0.0, 1.0, 0.0, 1.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn host_readings_are_normalised() {
        let host = HostSensors::new(7);
        for value in [host.activity(), host.pressure(), host.mood(), host.entropy()] {
            assert!((0.0..=1.0).contains(&value));
        }
    }
}
