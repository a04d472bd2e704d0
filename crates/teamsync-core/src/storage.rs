//! Persistent storage as one JSON file per concern.
//!
//! Every file lives under the node's data directory and is replaced
//! atomically: the new contents are written to a temporary file in the same
//! directory and then renamed over the old one. A crash mid-write leaves the
//! previous version in place.
//!
//! ```text
//! {data_dir}/
//! ├── identity.json
//! ├── team.json
//! ├── installed-skills.json
//! ├── network-config.json
//! ├── skill-index/{team}.json
//! ├── project-config/{team}.json
//! ├── sessions/{team}.json
//! ├── daily-summary-index/{team}.json
//! └── weekly-stats-cache/{team}.json
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{TeamError, TeamResult};

pub const IDENTITY_FILE: &str = "identity.json";
pub const TEAM_FILE: &str = "team.json";
pub const INSTALLED_SKILLS_FILE: &str = "installed-skills.json";
pub const NETWORK_CONFIG_FILE: &str = "network-config.json";

/// Per-team file locations.
pub fn skill_index_file(team_id: &str) -> String {
    format!("skill-index/{}.json", team_id)
}

pub fn project_config_file(team_id: &str) -> String {
    format!("project-config/{}.json", team_id)
}

pub fn sessions_file(team_id: &str) -> String {
    format!("sessions/{}.json", team_id)
}

pub fn daily_summary_index_file(team_id: &str) -> String {
    format!("daily-summary-index/{}.json", team_id)
}

pub fn weekly_stats_cache_file(team_id: &str) -> String {
    format!("weekly-stats-cache/{}.json", team_id)
}

/// Storage layer rooted at the node's data directory
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
    /// Serializes writers so two tasks never race on the same temp/rename pair
    write_lock: Arc<Mutex<()>>,
}

impl Storage {
    /// Create a storage handle, creating the root directory if needed.
    pub fn new(root: impl AsRef<Path>) -> TeamResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// The data directory this storage is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a relative storage key.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // JSON Documents
    // ═══════════════════════════════════════════════════════════════════════

    /// Read and decode a JSON document. Returns `None` if the file is absent.
    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> TeamResult<Option<T>> {
        let path = self.path(name);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&data).map_err(|e| {
            TeamError::Storage(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    /// Encode and atomically replace a JSON document.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> TeamResult<()> {
        let data = serde_json::to_vec_pretty(value)?;
        self.write_bytes(name, &data)
    }

    /// Atomically replace a file's contents.
    pub fn write_bytes(&self, name: &str, data: &[u8]) -> TeamResult<()> {
        let path = self.path(name);
        let parent = path
            .parent()
            .ok_or_else(|| TeamError::Storage(format!("invalid storage key: {}", name)))?;

        let _guard = self.write_lock.lock();
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| TeamError::Storage(format!("failed to persist {}: {}", path.display(), e)))?;

        debug!(file = %name, bytes = data.len(), "Wrote state file");
        Ok(())
    }

    /// Delete a document. Missing files are not an error.
    pub fn remove(&self, name: &str) -> TeamResult<()> {
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether a document exists.
    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }
}
