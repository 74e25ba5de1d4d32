//! Persistence layer.
//!
//! Saves and loads the comparison snapshot (token → market cap) to/from a
//! JSON file. A missing file means "first run" and loads as an empty map;
//! a file that exists but cannot be read or parsed is reported as
//! `CapwatchError::CorruptSnapshot` and aborts the run.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{CapMap, CapwatchError};

/// Default snapshot file path.
pub const DEFAULT_STATE_FILE: &str = "capwatch_state.json";

/// Abstraction over snapshot persistence.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotStore: Send + Sync {
    /// Load the previous run's mapping. Empty when none was ever saved.
    fn load(&self) -> Result<CapMap>;

    /// Replace the persisted mapping with `caps`.
    fn save(&self, caps: &CapMap) -> Result<()>;
}

/// Snapshot stored as a pretty-printed JSON object.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the snapshot file (for resets and tests).
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to delete snapshot {}", self.path.display()))?;
        }
        Ok(())
    }

    fn corrupt(&self, reason: impl ToString) -> anyhow::Error {
        CapwatchError::CorruptSnapshot {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
    }
}

impl Default for JsonSnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<CapMap> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot found, treating as first run");
                return Ok(CapMap::new());
            }
            Err(e) => return Err(self.corrupt(e)),
        };

        let caps: CapMap = serde_json::from_str(&json).map_err(|e| self.corrupt(e))?;

        if let Some((token, cap)) = caps.iter().find(|(_, c)| !c.is_finite() || **c < 0.0) {
            return Err(self.corrupt(format!("invalid market cap {cap} for {token}")));
        }

        info!(path = %self.path.display(), tokens = caps.len(), "Snapshot loaded from disk");
        Ok(caps)
    }

    fn save(&self, caps: &CapMap) -> Result<()> {
        if let Some((token, cap)) = caps.iter().find(|(_, c)| !c.is_finite()) {
            return Err(CapwatchError::Storage(format!(
                "refusing to persist non-finite market cap {cap} for {token}"
            ))
            .into());
        }

        let json = serde_json::to_string_pretty(caps).context("Failed to serialise snapshot")?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;
        }

        // Write-then-rename so a crash never leaves a half-written snapshot.
        let tmp = self.temp_path();
        let write = || -> Result<()> {
            let mut file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(json.as_bytes())
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", tmp.display()))?;
            fs::rename(&tmp, &self.path)
                .with_context(|| format!("Failed to move snapshot into {}", self.path.display()))?;
            Ok(())
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        debug!(path = %self.path.display(), tokens = caps.len(), "Snapshot saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
