//! Installed-skill bookkeeping and install conflict detection.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConflictType, TeamError, TeamResult};
use crate::storage::{Storage, INSTALLED_SKILLS_FILE};
use crate::types::{now, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledSkill {
    pub version: String,
    pub installed_at: Timestamp,
}

/// An install record listed together with its tracking id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledSkillEntry {
    pub full_id: String,
    #[serde(flatten)]
    pub skill: InstalledSkill,
}

/// `"{team_id}:{plugin_id}"`, the key of team-installed skills.
pub fn full_id(team_id: &str, plugin_id: &str) -> String {
    format!("{}:{}", team_id, plugin_id)
}

/// Directory name a tracked id installs under (the part after the last ':').
pub fn install_name_of(full_id: &str) -> &str {
    full_id.rsplit(':').next().unwrap_or(full_id)
}

/// A reason an install would overwrite something it does not own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillConflict {
    pub skill_name: String,
    /// The id already occupying the directory (or the requested one for
    /// manual installs)
    pub plugin_id: String,
    pub conflict_type: ConflictType,
    pub message: String,
}

impl SkillConflict {
    /// Soft conflicts can be overridden with `force`.
    pub fn is_overridable(&self) -> bool {
        self.conflict_type == ConflictType::ManualInstall
    }
}

impl From<SkillConflict> for TeamError {
    fn from(c: SkillConflict) -> Self {
        TeamError::SkillConflict {
            skill_name: c.skill_name,
            plugin_id: c.plugin_id,
            conflict_type: c.conflict_type,
            message: c.message,
        }
    }
}

/// Persisted `full_id -> InstalledSkill` map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstalledSkillState {
    #[serde(default)]
    pub skills: BTreeMap<String, InstalledSkill>,
}

impl InstalledSkillState {
    pub fn load(storage: &Storage) -> TeamResult<Self> {
        Ok(storage.read_json(INSTALLED_SKILLS_FILE)?.unwrap_or_default())
    }

    pub fn save(&self, storage: &Storage) -> TeamResult<()> {
        storage.write_json(INSTALLED_SKILLS_FILE, self)
    }

    pub fn record(&mut self, full_id: &str, version: &str) {
        self.skills.insert(
            full_id.to_string(),
            InstalledSkill {
                version: version.to_string(),
                installed_at: now(),
            },
        );
    }

    pub fn forget(&mut self, full_id: &str) -> Option<InstalledSkill> {
        self.skills.remove(full_id)
    }

    pub fn get(&self, full_id: &str) -> Option<&InstalledSkill> {
        self.skills.get(full_id)
    }

    /// Records ordered by id.
    pub fn entries(&self) -> Vec<InstalledSkillEntry> {
        self.skills
            .iter()
            .map(|(id, skill)| InstalledSkillEntry {
                full_id: id.clone(),
                skill: skill.clone(),
            })
            .collect()
    }

    /// Decide whether installing `full_id` into `skills_dir/install_name`
    /// would clobber something.
    ///
    /// - directory absent: free, whatever the state says
    /// - tracked under `full_id`: upgrade, free
    /// - tracked under a different id with the same install name: hard
    /// - present on disk but tracked by nobody: soft
    pub fn check_conflict(
        &self,
        skills_dir: &Path,
        install_name: &str,
        full_id: &str,
    ) -> Option<SkillConflict> {
        if !skills_dir.join(install_name).exists() || self.skills.contains_key(full_id) {
            return None;
        }

        if let Some(other) = self
            .skills
            .keys()
            .find(|id| id.as_str() != full_id && install_name_of(id) == install_name)
        {
            return Some(SkillConflict {
                skill_name: install_name.to_string(),
                plugin_id: other.clone(),
                conflict_type: ConflictType::OtherPlugin,
                message: format!(
                    "skill '{}' is already installed by '{}'",
                    install_name, other
                ),
            });
        }

        Some(SkillConflict {
            skill_name: install_name.to_string(),
            plugin_id: full_id.to_string(),
            conflict_type: ConflictType::ManualInstall,
            message: format!(
                "skill '{}' already exists and was not installed by teamsync",
                install_name
            ),
        })
    }

    /// Drop entries other than `full_id` that install under `install_name`.
    /// Used when their directory is gone and `full_id` takes the name over.
    pub fn forget_stale(&mut self, install_name: &str, full_id: &str) -> Vec<String> {
        let stale: Vec<String> = self
            .skills
            .keys()
            .filter(|id| id.as_str() != full_id && install_name_of(id) == install_name)
            .cloned()
            .collect();
        for id in &stale {
            self.skills.remove(id);
        }
        stale
    }
}
