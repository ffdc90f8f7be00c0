// ── File-backed setup store ──
//
// One JSON document per profile holding the persisted `IoMap`. Writes go
// through a sibling temp file and a rename so a crash mid-write never
// leaves a truncated state file behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use wifipool_core::{CoreError, IoMap, SetupStore};

use crate::{ConfigError, data_dir};

/// Persists the discovery result as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct FileSetupStore {
    path: PathBuf,
}

impl FileSetupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The canonical state file for a profile: `<data dir>/setup-<profile>.json`.
    pub fn for_profile(profile_name: &str) -> Self {
        Self::new(data_dir().join(format!("setup-{profile_name}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<IoMap>, ConfigError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn write(&self, map: &IoMap) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "setup state written");
        Ok(())
    }

    pub fn remove(&self) -> Result<(), ConfigError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn store_error(path: &Path, err: &ConfigError) -> CoreError {
    CoreError::Store {
        message: format!("{}: {err}", path.display()),
    }
}

impl SetupStore for FileSetupStore {
    fn load(&self) -> Result<Option<IoMap>, CoreError> {
        self.read().map_err(|e| store_error(&self.path, &e))
    }

    fn save(&self, map: &IoMap) -> Result<(), CoreError> {
        self.write(map).map_err(|e| store_error(&self.path, &e))
    }

    fn clear(&self) -> Result<(), CoreError> {
        self.remove().map_err(|e| store_error(&self.path, &e))
    }
}
