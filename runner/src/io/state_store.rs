//! Registration state persisted between passes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::reconcile::RunnerState;
use crate::core::types::RunnerStatus;

/// Last observed status per runner name (`state.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateFile {
    pub runners: BTreeMap<String, RunnerStatus>,
    /// Set when the file or a runner changed and the service has not yet
    /// been restarted successfully. Survives a failed pass.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reload_pending: bool,
}

impl StateFile {
    pub fn record(&mut self, name: &str, status: RunnerStatus) {
        self.runners.insert(name.to_string(), status);
    }
}

impl RunnerState for StateFile {
    fn status(&self, name: &str) -> RunnerStatus {
        self.runners.status(name)
    }
}

/// Where a pass reads and persists [`StateFile`].
pub trait StateStore {
    fn load(&self) -> Result<StateFile>;
    fn save(&self, state: &StateFile) -> Result<()>;
}

/// [`StateStore`] backed by the JSON file at `path`.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<StateFile> {
        load_state(&self.path)
    }

    fn save(&self, state: &StateFile) -> Result<()> {
        write_state(&self.path, state)
    }
}

/// Load state from disk; a missing file means nothing is registered yet.
pub fn load_state(path: &Path) -> Result<StateFile> {
    if !path.exists() {
        debug!(path = %path.display(), "no state file, starting empty");
        return Ok(StateFile::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: StateFile = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(runners = state.runners.len(), "state loaded");
    Ok(state)
}

/// Atomically write state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &StateFile) -> Result<()> {
    debug!(path = %path.display(), runners = state.runners.len(), "writing state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
