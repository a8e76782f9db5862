//! Checkpoint snapshots for interrupted scans.
//!
//! A snapshot lists the targets that were never handed to a worker. It is
//! written once, atomically, when a run is interrupted and read once (then
//! deleted) when a run resumes from it.

use crate::error::{CheckpointError, CheckpointResult};
use crate::types::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Snapshot format version written by this build.
pub const CHECKPOINT_VERSION: &str = "1";

/// Targets left over from an interrupted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    /// Targets that were never dispatched, in no particular order.
    pub remaining: Vec<Target>,
    /// Format version.
    pub version: String,
    /// When the snapshot was taken.
    pub time: DateTime<Utc>,
}

impl CheckpointSnapshot {
    /// Take a snapshot of `remaining` now.
    pub fn new(remaining: Vec<Target>) -> Self {
        Self {
            remaining,
            version: CHECKPOINT_VERSION.to_string(),
            time: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Write the snapshot to `path`.
    ///
    /// The JSON goes to `<path>.tmp` first and is renamed into place, so a
    /// reader never sees a half-written checkpoint.
    pub fn save(&self, path: &Path) -> CheckpointResult<()> {
        let tmp = tmp_path(path);
        let content = serde_json::to_vec_pretty(self)?;

        let write = |target: &Path| -> std::io::Result<()> {
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, &content)
        };
        write(&tmp).map_err(|source| CheckpointError::WriteFailed {
            path: tmp.clone(),
            source,
        })?;

        fs::rename(&tmp, path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            CheckpointError::WriteFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;

        info!(path = %path.display(), remaining = self.len(), "checkpoint saved");
        Ok(())
    }

    /// Read a snapshot without touching the file.
    pub fn load(path: &Path) -> CheckpointResult<Self> {
        let content = fs::read(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                CheckpointError::NotFound(path.to_path_buf())
            } else {
                CheckpointError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let snapshot: Self =
            serde_json::from_slice(&content).map_err(|e| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if snapshot.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported version {:?}", snapshot.version),
            });
        }
        info!(
            path = %path.display(),
            remaining = snapshot.len(),
            taken = %snapshot.time.to_rfc3339(),
            "checkpoint loaded"
        );
        Ok(snapshot)
    }

    /// Delete a checkpoint whose targets a started run has taken over, so
    /// it is used at most once.
    ///
    /// Call only once probing is certain to begin: until then the file is
    /// the only record of those targets.
    pub fn discard(path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "checkpoint consumed"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not delete consumed checkpoint"),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
