//! Skill packaging and team replication.

pub mod index;
pub mod installed;
pub mod manifest;
pub mod packager;
pub mod sync;
pub mod tracker;

pub use index::{SkillPackageMeta, TeamSkillEntry, TeamSkillIndex};
pub use installed::{InstalledSkill, InstalledSkillEntry, InstalledSkillState, SkillConflict};
pub use manifest::SkillMetadata;
pub use packager::{PackedSkill, UnpackedSkill, ValidationResult};
pub use sync::{SkillSyncDeps, SkillSyncService};
pub use tracker::{DownloadState, DownloadStatus, DownloadTracker};
