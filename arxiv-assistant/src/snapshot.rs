use crate::types::Result;
use chrono::NaiveDate;
use interfaces::date_key;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    All,
    Filtered,
    Removed,
}

impl SnapshotKind {
    pub fn suffix(self) -> &'static str {
        match self {
            SnapshotKind::All => "all",
            SnapshotKind::Filtered => "filtered",
            SnapshotKind::Removed => "removed",
        }
    }
}

/// Dated JSON dumps of each run, `{dir}/{date}_{suffix}.json`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, date: NaiveDate, kind: SnapshotKind) -> PathBuf {
        self.dir.join(format!("{}_{}.json", date_key(date), kind.suffix()))
    }

    pub fn write<T: Serialize + ?Sized>(&self, date: NaiveDate, kind: SnapshotKind, value: &T) -> Result<PathBuf> {
        let path = self.path_for(date, kind);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)?;
        debug!("Wrote snapshot {}", path.display());
        Ok(path)
    }
}
