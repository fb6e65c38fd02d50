use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::{CycleStateView, Tick, Zone};

/// What survives a restart. Only `tick` and `rebloom_count` are resumed; the
/// rest is there for operators reading the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub tick: Tick,
    pub rebloom_count: u64,
    pub zone: Zone,
    pub saved_at_ms: u64,
    #[serde(default)]
    pub heat: f64,
    #[serde(default)]
    pub coherence: f64,
}

impl PersistedState {
    pub fn capture(view: &CycleStateView, saved_at_ms: u64) -> Self {
        PersistedState {
            tick: view.tick,
            rebloom_count: view.rebloom_count,
            zone: view.zone,
            saved_at_ms,
            heat: view.heat,
            coherence: view.coherence,
        }
    }
}

/// Where the scheduler saves its state. Implementations log their own I/O
/// failures; the loop never stops because a write failed.
pub trait StateJournal: Send + Sync {
    fn persist(&self, state: &PersistedState);

    fn restore(&self) -> Option<PersistedState>;
}

/// Keeps the last persisted state in memory.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    last: Option<PersistedState>,
    writes: u64,
}

impl MemoryJournal {
    pub fn with_state(state: PersistedState) -> Self {
        MemoryJournal {
            inner: Mutex::new(MemoryInner {
                last: Some(state),
                writes: 0,
            }),
        }
    }

    pub fn last(&self) -> Option<PersistedState> {
        self.inner.lock().last.clone()
    }

    pub fn writes(&self) -> u64 {
        self.inner.lock().writes
    }
}

impl StateJournal for MemoryJournal {
    fn persist(&self, state: &PersistedState) {
        let mut inner = self.inner.lock();
        inner.last = Some(state.clone());
        inner.writes += 1;
    }

    fn restore(&self) -> Option<PersistedState> {
        self.last()
    }
}
