//! Team skill index.
//!
//! The leader keeps the canonical index; members cache the last copy they
//! fetched so `list_skills` still answers while the leader is down.

use serde::{Deserialize, Serialize};

use crate::error::TeamResult;
use crate::storage::{skill_index_file, Storage};
use crate::types::{now, Timestamp};

/// A published skill as advertised to the team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillPackageMeta {
    pub plugin_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub author_id: String,
    pub author_name: String,
    /// `host:port` serving `/p2p/skills/{plugin_id}/download`
    pub author_endpoint: String,
    pub file_count: usize,
    pub total_size: u64,
    pub checksum: String,
    pub published_at: Timestamp,
}

/// Index entries and package metadata share a shape.
pub type TeamSkillEntry = SkillPackageMeta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSkillIndex {
    pub team_id: String,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub skills: Vec<TeamSkillEntry>,
}

impl TeamSkillIndex {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            updated_at: now(),
            skills: Vec::new(),
        }
    }

    pub fn find_skill(&self, plugin_id: &str) -> Option<&TeamSkillEntry> {
        self.skills.iter().find(|s| s.plugin_id == plugin_id)
    }

    /// Insert or replace by plugin id. Returns true when the entry replaced
    /// an existing one.
    pub fn add_or_update_skill(&mut self, entry: TeamSkillEntry) -> bool {
        self.updated_at = now();
        match self.skills.iter_mut().find(|s| s.plugin_id == entry.plugin_id) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.skills.push(entry);
                false
            }
        }
    }

    /// Remove by plugin id, returning the removed entry.
    pub fn remove_skill(&mut self, plugin_id: &str) -> Option<TeamSkillEntry> {
        let pos = self.skills.iter().position(|s| s.plugin_id == plugin_id)?;
        self.updated_at = now();
        Some(self.skills.remove(pos))
    }

    /// Load the stored index for `team_id`, or an empty one.
    pub fn load(storage: &Storage, team_id: &str) -> TeamResult<Self> {
        Ok(storage
            .read_json(&skill_index_file(team_id))?
            .unwrap_or_else(|| Self::new(team_id)))
    }

    pub fn save(&self, storage: &Storage) -> TeamResult<()> {
        storage.write_json(&skill_index_file(&self.team_id), self)
    }

    pub fn delete(storage: &Storage, team_id: &str) -> TeamResult<()> {
        storage.remove(&skill_index_file(team_id))
    }
}

#[cfg(test)]
pub(crate) fn sample_entry(plugin_id: &str, checksum: &str) -> TeamSkillEntry {
    SkillPackageMeta {
        plugin_id: plugin_id.to_string(),
        name: plugin_id.to_string(),
        description: "test skill".to_string(),
        version: "1.0.0".to_string(),
        category: Some("tools".to_string()),
        author_id: "author".to_string(),
        author_name: "Author".to_string(),
        author_endpoint: "127.0.0.1:19960".to_string(),
        file_count: 1,
        total_size: 10,
        checksum: checksum.to_string(),
        published_at: now(),
    }
}
