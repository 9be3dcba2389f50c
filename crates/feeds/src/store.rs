//! JSON file persistence for pass state.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use roadsigns_recon::state::STATE_VERSION;
use roadsigns_recon::{PassState, ReconError, StateStore};

/// `<data dir>/roadsigns/state.json`, when the platform has a data dir.
pub fn default_state_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("roadsigns").join("state.json"))
}

/// Keeps the last committed pass in one JSON file.
///
/// A missing file is an empty first pass. An unreadable or newer-version
/// file is an error: silently starting over would reassign every id.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state_err(&self, what: &str, e: impl std::fmt::Display) -> ReconError {
        ReconError::State(format!("{what} {}: {e}", self.path.display()))
    }
}

impl StateStore for JsonStateStore {
    fn load_previous_state(&self) -> Result<PassState, ReconError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no state at {}, starting empty", self.path.display());
                return Ok(PassState::default());
            }
            Err(e) => return Err(self.state_err("cannot read", e)),
        };

        let state: PassState =
            serde_json::from_str(&contents).map_err(|e| self.state_err("cannot parse", e))?;
        if state.version > STATE_VERSION {
            return Err(ReconError::State(format!(
                "{} was written by a newer version (state v{}, supported v{})",
                self.path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        state.into_checked().map_err(|e| match e {
            ReconError::State(msg) => self.state_err("inconsistent", msg),
            other => other,
        })
    }

    /// Write to a temp file, then rename over the old state.
    fn save_pass_state(&self, state: &PassState) -> Result<(), ReconError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.state_err("cannot create directory for", e))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        {
            let json = serde_json::to_string_pretty(state)
                .map_err(|e| self.state_err("cannot serialize", e))?;
            let mut file =
                fs::File::create(&temp_path).map_err(|e| self.state_err("cannot write", e))?;
            file.write_all(json.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| self.state_err("cannot write", e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| self.state_err("cannot replace", e))?;
        log::debug!(
            "saved {} entities to {}",
            state.entities.len(),
            self.path.display()
        );
        Ok(())
    }
}
