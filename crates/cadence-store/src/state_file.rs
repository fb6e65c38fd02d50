use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use cadence_core::{PersistedState, StateJournal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub writes: u64,
    pub failures: u64,
}

/// Scheduler state kept in a single JSON file, replaced atomically on every
/// write via a sibling temp file and rename.
pub struct StateFile {
    path: PathBuf,
    tmp_path: PathBuf,
    write_lock: Mutex<()>,
    writes: AtomicU64,
    failures: AtomicU64,
}

impl StateFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state dir {parent:?}"))?;
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Ok(StateFile {
            path,
            tmp_path,
            write_lock: Mutex::new(()),
            writes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &PersistedState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state).context("failed to encode state")?;
        let _guard = self.write_lock.lock();
        let mut file = File::create(&self.tmp_path)
            .with_context(|| format!("failed to create {:?}", self.tmp_path))?;
        file.write_all(&bytes)
            .with_context(|| format!("failed to write {:?}", self.tmp_path))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {:?}", self.tmp_path))?;
        fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("failed to replace {:?}", self.path))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes =
            fs::read(&self.path).with_context(|| format!("failed to read {:?}", self.path))?;
        let state = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode {:?}", self.path))?;
        Ok(Some(state))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            writes: self.writes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl StateJournal for StateFile {
    fn persist(&self, state: &PersistedState) {
        match self.save(state) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = ?self.path, error = %format!("{err:#}"), "store.persist_failed");
            }
        }
    }

    fn restore(&self) -> Option<PersistedState> {
        match self.load() {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(path = ?self.path, error = %format!("{err:#}"), "store.restore_failed");
                None
            }
        }
    }
}
