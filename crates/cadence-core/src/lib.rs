pub mod candidate;
pub mod cascade;
pub mod coherence;
pub mod config;
pub mod drift;
pub mod hooks;
pub mod interval;
pub mod journal;
pub mod queue;
pub mod reflex;
pub mod sampler;
pub mod scheduler;
pub mod stats;
pub mod thermal;
pub mod types;
pub mod zone;

pub use candidate::RebloomCandidate;
pub use cascade::{CascadeConfig, CascadeOutcome, CascadeReport, CascadeRiskMonitor};
pub use coherence::{CoherenceConfig, CoherenceScorer};
pub use config::{ConfigError, SchedulerConfig};
pub use drift::{DriftConfig, DriftModel};
pub use hooks::{Alert, CycleHooks, Intervention, NoopHooks};
pub use interval::{IntervalConfig, IntervalInputs};
pub use journal::{MemoryJournal, PersistedState, StateJournal};
pub use queue::{QueueConfig, QueueRejection, QueuedEntry, RebloomPriorityQueue};
pub use reflex::{Cooldowns, ReflexConfig, ReflexDispatcher, ReflexFire, ReflexKind};
pub use sampler::{Channel, SamplerError, SamplerSensors, Sensor, SignalSampler};
pub use scheduler::{Scheduler, StopHandle};
pub use stats::{EngineStats, ExperimentalState, ThermalProfile};
pub use thermal::{ThermalConfig, ThermalModel};
pub use types::{now_ms, CycleState, CycleStateView, Signals, Tick, Zone, ZoneTimers};
pub use zone::{ZoneClassifier, ZoneConfig, ZoneTransition};
