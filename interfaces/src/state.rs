use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::defs::date_key;

/// Days that have already been delivered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub processed_dates: BTreeSet<String>,
}

impl RunState {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.processed_dates.contains(&date_key(date))
    }

    /// Returns false if the date was already recorded.
    pub fn record(&mut self, date: NaiveDate) -> bool {
        self.processed_dates.insert(date_key(date))
    }

    pub fn len(&self) -> usize {
        self.processed_dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_dates.is_empty()
    }
}

/// Load/save hooks for `RunState`.
pub trait RunStateStore: Send + Sync {
    fn load(&self) -> Result<RunState>;
    fn save(&self, state: &RunState) -> Result<()>;
}

/// Keeps nothing: every process starts with an empty history.
#[derive(Debug, Default)]
pub struct MemoryStateStore;

impl RunStateStore for MemoryStateStore {
    fn load(&self) -> Result<RunState> {
        Ok(RunState::default())
    }

    fn save(&self, _state: &RunState) -> Result<()> {
        Ok(())
    }
}

/// Persists the history as a JSON document so a restarted process resumes
/// without re-sending a day.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunStateStore for JsonFileStateStore {
    fn load(&self) -> Result<RunState> {
        if !self.path.exists() {
            debug!("No run state at {}, starting empty", self.path.display());
            return Ok(RunState::default());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading run state {}", self.path.display()))?;
        let state = serde_json::from_str(&text)
            .with_context(|| format!("parsing run state {}", self.path.display()))?;
        Ok(state)
    }

    fn save(&self, state: &RunState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write-then-rename: the state file is never observed half-written.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing run state {}", self.path.display()))?;
        debug!("Saved {} processed dates to {}", state.len(), self.path.display());
        Ok(())
    }
}
