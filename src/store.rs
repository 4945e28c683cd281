//! JSON file persistence for [`AgentState`].
//!
//! Writes go to a sibling `*.tmp` file which is flushed, synced and then
//! renamed over the target, so a crash mid-write leaves the previous state
//! intact. Loading never fails: a missing or unusable file yields a fresh
//! state, and an unusable one is moved aside as `*.corrupt-<unix-secs>`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::state::{AgentState, SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write state {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
enum LoadError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("not valid state JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing schema_version")]
    MissingVersion,
    #[error("unsupported schema_version {0}")]
    UnsupportedVersion(u64),
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

impl LoadError {
    /// Content problems get the file quarantined; I/O problems leave it alone.
    fn is_corrupt(&self) -> bool {
        !matches!(self, LoadError::Io(_))
    }
}

#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state, or a fresh one started now.
    pub fn load(&self) -> AgentState {
        self.load_at(Utc::now())
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> AgentState {
        match self.try_load() {
            Ok(Some(state)) => {
                info!(
                    path = %self.path.display(),
                    history = state.history.len(),
                    signals = state.signals.len(),
                    started_at = %state.started_at,
                    "loaded agent state"
                );
                state
            }
            Ok(None) => {
                info!(path = %self.path.display(), "no prior state, starting fresh");
                AgentState::new(now)
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "state file unusable, starting fresh");
                if err.is_corrupt() {
                    self.quarantine(now);
                }
                AgentState::new(now)
            }
        }
    }

    fn try_load(&self) -> Result<Option<AgentState>, LoadError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let raw: Value = serde_json::from_slice(&bytes)?;
        migrate(raw).map(Some)
    }

    fn quarantine(&self, now: DateTime<Utc>) {
        let target = self.sibling(&format!(".corrupt-{}", now.timestamp()));
        match fs::rename(&self.path, &target) {
            Ok(()) => warn!(preserved = %target.display(), "kept corrupt state file for inspection"),
            Err(err) => warn!(error = %err, "could not preserve corrupt state file"),
        }
    }

    pub fn save(&self, state: &AgentState) -> Result<(), PersistenceError> {
        let payload = serde_json::to_vec_pretty(state)?;
        let tmp = self.sibling(".tmp");

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| PersistenceError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let written = write_synced(&tmp, &payload).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(source) = written {
            let _ = fs::remove_file(&tmp);
            return Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            });
        }
        debug!(path = %self.path.display(), bytes = payload.len(), "state persisted");
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("agent_state.json"));
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(payload)?;
    writer.write_all(b"\n")?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// Dispatch on `schema_version` before typed deserialization, then reject
/// content the agent could not make progress from.
fn migrate(raw: Value) -> Result<AgentState, LoadError> {
    let version = raw
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or(LoadError::MissingVersion)?;
    let state: AgentState = match version {
        v if v == u64::from(SCHEMA_VERSION) => serde_json::from_value(raw)?,
        other => return Err(LoadError::UnsupportedVersion(other)),
    };
    state.check_consistency().map_err(LoadError::Inconsistent)?;
    Ok(state)
}
