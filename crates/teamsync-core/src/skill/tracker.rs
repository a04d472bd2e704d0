//! In-memory download status table.
//!
//! Every download holds a [`DownloadGuard`]. Completing or failing through
//! the guard updates the table; dropping it unfinished (the download future
//! was cancelled or timed out) marks the entry failed, so no entry is ever
//! left in `downloading`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{now, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Downloading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub plugin_id: String,
    pub team_id: String,
    pub status: DownloadState,
    /// 0..=100
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// Shared status table keyed by plugin id
#[derive(Debug, Clone, Default)]
pub struct DownloadTracker {
    statuses: Arc<RwLock<HashMap<String, DownloadStatus>>>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `plugin_id` as downloading and return the guard owning it.
    pub fn begin(&self, team_id: &str, plugin_id: &str) -> DownloadGuard {
        self.statuses.write().insert(
            plugin_id.to_string(),
            DownloadStatus {
                plugin_id: plugin_id.to_string(),
                team_id: team_id.to_string(),
                status: DownloadState::Downloading,
                progress: 0,
                error: None,
                downloaded_at: None,
                local_path: None,
            },
        );
        DownloadGuard {
            tracker: self.clone(),
            plugin_id: plugin_id.to_string(),
            finished: false,
        }
    }

    /// Record a completed download found on disk at startup.
    pub fn restore_completed(&self, team_id: &str, plugin_id: &str, local_path: &Path) {
        self.statuses.write().insert(
            plugin_id.to_string(),
            DownloadStatus {
                plugin_id: plugin_id.to_string(),
                team_id: team_id.to_string(),
                status: DownloadState::Completed,
                progress: 100,
                error: None,
                downloaded_at: None,
                local_path: Some(local_path.display().to_string()),
            },
        );
    }

    pub fn get(&self, plugin_id: &str) -> Option<DownloadStatus> {
        self.statuses.read().get(plugin_id).cloned()
    }

    /// All statuses, sorted by plugin id.
    pub fn all(&self) -> Vec<DownloadStatus> {
        let mut all: Vec<_> = self.statuses.read().values().cloned().collect();
        all.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        all
    }

    /// Drop every entry belonging to `team_id`.
    pub fn clear_team(&self, team_id: &str) {
        self.statuses.write().retain(|_, s| s.team_id != team_id);
    }

    fn update(&self, plugin_id: &str, f: impl FnOnce(&mut DownloadStatus)) {
        if let Some(status) = self.statuses.write().get_mut(plugin_id) {
            f(status);
        }
    }
}

/// Owns one in-flight download's status entry
#[derive(Debug)]
pub struct DownloadGuard {
    tracker: DownloadTracker,
    plugin_id: String,
    finished: bool,
}

impl DownloadGuard {
    pub fn set_progress(&self, progress: u8) {
        self.tracker
            .update(&self.plugin_id, |s| s.progress = progress.min(100));
    }

    pub fn complete(mut self, local_path: &Path) {
        self.finished = true;
        let path = local_path.display().to_string();
        self.tracker.update(&self.plugin_id, |s| {
            s.status = DownloadState::Completed;
            s.progress = 100;
            s.error = None;
            s.downloaded_at = Some(now());
            s.local_path = Some(path);
        });
    }

    pub fn fail(mut self, error: impl Into<String>) {
        self.finished = true;
        self.mark_failed(error.into());
    }

    fn mark_failed(&self, error: String) {
        self.tracker.update(&self.plugin_id, |s| {
            s.status = DownloadState::Failed;
            s.error = Some(error);
        });
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.mark_failed("download cancelled".to_string());
        }
    }
}
