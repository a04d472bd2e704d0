//! Skill publishing, replication and installation.
//!
//! ```text
//! author node                       leader                     any member
//! ───────────                       ──────                     ──────────
//! publish(path)
//!   copy → team-skills-published/{team}/{plugin}
//!   register plugin → path
//!   POST /team/{id}/skills ───────► index.add_or_update
//!                                   broadcast skill_published ─► cache index
//!
//!                                            download(plugin)
//!   GET /p2p/skills/{plugin}/download ◄───── fetch archive
//!   pack(published copy) ──────────────────► unpack + verify in memory
//!                                            stage → swap team-skills/{team}/{plugin}
//!                                            install(force?)
//!                                            stage → swap {skills_dir}/{plugin}
//! ```
//!
//! Everything written to a skill directory goes through a staging sibling
//! and [`replace_dir`], so readers only ever see a complete old or complete
//! new copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{TeamError, TeamResult};
use crate::identity::IdentityStore;
use crate::network::NetworkManager;
use crate::presence::events::{Event, EventType, SkillEventPayload};
use crate::presence::hub::PresenceHub;
use crate::skill::index::{SkillPackageMeta, TeamSkillIndex};
use crate::skill::installed::{full_id, InstalledSkill, InstalledSkillState, SkillConflict};
use crate::skill::manifest::{read_manifest, slugify, validate_plugin_id, SkillMetadata, SKILL_MANIFEST};
use crate::skill::packager::{
    self, checksum_dir, clean_transient_dirs, collect_files, copy_dir, discard_backup, replace_dir,
    restore_backup, staging_dir_for, swap_dir, ValidationResult,
};
use crate::skill::tracker::{DownloadGuard, DownloadStatus, DownloadTracker};
use crate::storage::Storage;
use crate::team::client::MembershipClient;
use crate::team::model::Team;
use crate::team::registry::TeamRegistry;
use crate::types::now;

/// Directory (under the data dir) holding this node's published copies
pub const PUBLISHED_DIR: &str = "team-skills-published";
/// Directory (under the data dir) holding downloaded team skills
pub const DOWNLOADS_DIR: &str = "team-skills";

#[derive(Debug, Clone)]
struct PublishedSkill {
    team_id: String,
    path: PathBuf,
    meta: SkillPackageMeta,
}

/// Everything `SkillSyncService` needs from the rest of the node
#[derive(Clone)]
pub struct SkillSyncDeps {
    pub storage: Storage,
    pub identity: IdentityStore,
    pub registry: TeamRegistry,
    pub hub: PresenceHub,
    pub client: MembershipClient,
    pub network: NetworkManager,
    pub skills_dir: PathBuf,
}

pub struct SkillSyncService {
    storage: Storage,
    identity: IdentityStore,
    registry: TeamRegistry,
    hub: PresenceHub,
    client: MembershipClient,
    network: NetworkManager,
    skills_dir: PathBuf,
    tracker: DownloadTracker,
    published: RwLock<HashMap<String, PublishedSkill>>,
    installed: Mutex<InstalledSkillState>,
    /// Serializes load-modify-save of skill index files
    index_lock: Mutex<()>,
    /// One lock per install name, held from conflict check to state save
    install_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SkillSyncService {
    pub fn new(deps: SkillSyncDeps) -> TeamResult<Self> {
        let installed = InstalledSkillState::load(&deps.storage)?;
        Ok(Self {
            storage: deps.storage,
            identity: deps.identity,
            registry: deps.registry,
            hub: deps.hub,
            client: deps.client,
            network: deps.network,
            skills_dir: deps.skills_dir,
            tracker: DownloadTracker::new(),
            published: RwLock::new(HashMap::new()),
            installed: Mutex::new(installed),
            index_lock: Mutex::new(()),
            install_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    fn published_path(&self, team_id: &str, plugin_id: &str) -> PathBuf {
        self.storage.root().join(PUBLISHED_DIR).join(team_id).join(plugin_id)
    }

    fn download_path(&self, team_id: &str, plugin_id: &str) -> PathBuf {
        self.storage.root().join(DOWNLOADS_DIR).join(team_id).join(plugin_id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Publishing
    // ═══════════════════════════════════════════════════════════════════════

    pub fn validate(&self, path: &Path) -> TeamResult<ValidationResult> {
        packager::validate(path)
    }

    /// Publish the skill at `path` to the team.
    ///
    /// Without `metadata`, the manifest supplies everything and the plugin id
    /// is derived from the skill name.
    pub async fn publish(
        &self,
        team_id: &str,
        path: &Path,
        metadata: Option<SkillMetadata>,
    ) -> TeamResult<SkillPackageMeta> {
        let team = self.registry.get(team_id)?;
        let identity = self.identity.get()?;

        let validation = packager::validate(path)?;
        if !validation.valid {
            if path.is_dir() && !path.join(SKILL_MANIFEST).is_file() {
                return Err(TeamError::SkillManifestMissing(path.display().to_string()));
            }
            return Err(TeamError::validation(
                validation.error.unwrap_or_else(|| "invalid skill directory".into()),
            ));
        }

        let metadata = match metadata {
            Some(metadata) => {
                metadata.validate()?;
                metadata
            }
            None => {
                let plugin_id = slugify(&validation.name);
                validate_plugin_id(&plugin_id)?;
                SkillMetadata {
                    plugin_id,
                    name: validation.name.clone(),
                    description: validation.description.clone(),
                    version: validation.version.clone(),
                    category: validation.category.clone(),
                    author: validation.author.clone(),
                }
            }
        };
        let plugin_id = metadata.plugin_id.clone();

        let target = self.published_path(team_id, &plugin_id);
        let source = path.to_path_buf();
        let published = target.clone();
        let (checksum, file_count, total_size, backup) = blocking(move || {
            let staging = staging_dir_for(&published);
            copy_dir(&source, &staging)?;
            let (files, total_size) = collect_files(&staging)?;
            let checksum = checksum_dir(&staging)?;
            let backup = swap_dir(&staging, &published)?;
            Ok((checksum, files.len(), total_size, backup))
        })
        .await?;

        let author_endpoint = match self.author_endpoint(&team) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                if let Err(restore) = restore_backup(&target, backup) {
                    warn!(path = %target.display(), error = %restore, "Failed to restore published copy");
                }
                return Err(e);
            }
        };
        let meta = SkillPackageMeta {
            plugin_id: plugin_id.clone(),
            name: metadata.name,
            description: metadata.description,
            version: metadata.version,
            category: Some(metadata.category).filter(|c| !c.is_empty()),
            author_id: identity.id,
            author_name: identity.name,
            author_endpoint,
            file_count,
            total_size,
            checksum,
            published_at: now(),
        };

        let previous = self.published.write().insert(
            plugin_id.clone(),
            PublishedSkill {
                team_id: team_id.to_string(),
                path: target.clone(),
                meta: meta.clone(),
            },
        );

        let announced = if team.is_leader {
            self.apply_index_entry(team_id, meta.clone()).await.map(|_| ())
        } else {
            let path = format!("/team/{}/skills", team_id);
            self.client
                .forward_post::<_, SkillPackageMeta>(&team.leader_endpoint, &path, &meta)
                .await
                .and_then(|_| self.cache_entry(team_id, Some(meta.clone()), &plugin_id))
        };
        if let Err(e) = announced {
            self.roll_back_publish(&target, backup, previous, &plugin_id);
            return Err(e);
        }
        discard_backup(backup);

        info!(
            %team_id,
            %plugin_id,
            version = %meta.version,
            files = meta.file_count,
            checksum = %meta.checksum,
            "Skill published"
        );
        Ok(meta)
    }

    pub async fn unpublish(&self, team_id: &str, plugin_id: &str) -> TeamResult<()> {
        let team = self.registry.get(team_id)?;

        if team.is_leader {
            self.remove_index_entry(team_id, plugin_id).await?;
        } else {
            let path = format!("/team/{}/skills/{}", team_id, plugin_id);
            self.client.forward_delete(&team.leader_endpoint, &path).await?;
            self.cache_entry(team_id, None, plugin_id)?;
        }

        self.published.write().remove(plugin_id);
        remove_dir_if_exists(&self.published_path(team_id, plugin_id))?;
        info!(%team_id, %plugin_id, "Skill unpublished");
        Ok(())
    }

    /// Undo a publish whose announcement failed: the previous copy and
    /// registration (if any) keep being served.
    fn roll_back_publish(
        &self,
        target: &Path,
        backup: Option<PathBuf>,
        previous: Option<PublishedSkill>,
        plugin_id: &str,
    ) {
        if let Err(e) = restore_backup(target, backup) {
            warn!(path = %target.display(), error = %e, "Failed to restore published copy");
        }
        let mut published = self.published.write();
        match previous {
            Some(previous) => {
                published.insert(plugin_id.to_string(), previous);
            }
            None => {
                published.remove(plugin_id);
            }
        }
    }

    fn author_endpoint(&self, team: &Team) -> TeamResult<String> {
        if team.is_leader {
            self.network.endpoint()
        } else {
            self.network.endpoint_towards(&team.leader_endpoint)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Team Index
    // ═══════════════════════════════════════════════════════════════════════

    /// Add or replace an entry in the canonical index and announce it.
    pub async fn apply_index_entry(
        &self,
        team_id: &str,
        entry: SkillPackageMeta,
    ) -> TeamResult<SkillPackageMeta> {
        self.ensure_leader(team_id)?;
        validate_plugin_id(&entry.plugin_id)?;
        if entry.checksum.is_empty() {
            return Err(TeamError::validation("skill checksum is required"));
        }

        let replaced = {
            let _guard = self.index_lock.lock();
            let mut index = TeamSkillIndex::load(&self.storage, team_id)?;
            let replaced = index.add_or_update_skill(entry.clone());
            index.save(&self.storage)?;
            replaced
        };

        let event_type = if replaced {
            EventType::SkillUpdated
        } else {
            EventType::SkillPublished
        };
        let payload = SkillEventPayload {
            plugin_id: entry.plugin_id.clone(),
            skill: Some(entry.clone()),
        };
        self.broadcast(event_type, team_id, &payload).await;
        debug!(%team_id, plugin_id = %entry.plugin_id, %event_type, "Skill index updated");
        Ok(entry)
    }

    /// Drop an entry from the canonical index and announce it.
    pub async fn remove_index_entry(&self, team_id: &str, plugin_id: &str) -> TeamResult<()> {
        self.ensure_leader(team_id)?;
        {
            let _guard = self.index_lock.lock();
            let mut index = TeamSkillIndex::load(&self.storage, team_id)?;
            if index.remove_skill(plugin_id).is_none() {
                return Err(TeamError::SkillNotFound(plugin_id.to_string()));
            }
            index.save(&self.storage)?;
        }
        let payload = SkillEventPayload {
            plugin_id: plugin_id.to_string(),
            skill: None,
        };
        self.broadcast(EventType::SkillDeleted, team_id, &payload).await;
        Ok(())
    }

    /// The team's skills. Members fall back to their cached copy while the
    /// leader is unreachable.
    pub async fn list_skills(&self, team_id: &str) -> TeamResult<TeamSkillIndex> {
        let team = self.registry.get(team_id)?;
        if team.is_leader {
            return self.local_index(team_id);
        }

        match self.client.skill_index(&team.leader_endpoint, team_id).await {
            Ok(index) => {
                self.cache_index(&index)?;
                Ok(index)
            }
            Err(e) if e.is_unavailable() => {
                warn!(%team_id, error = %e, "Leader unreachable, serving cached skill index");
                self.local_index(team_id)
            }
            Err(e) => Err(e),
        }
    }

    /// Index as stored on this node (canonical on the leader, a cache elsewhere).
    pub fn local_index(&self, team_id: &str) -> TeamResult<TeamSkillIndex> {
        let _guard = self.index_lock.lock();
        TeamSkillIndex::load(&self.storage, team_id)
    }

    /// Canonical index, as served to members.
    pub fn canonical_index(&self, team_id: &str) -> TeamResult<TeamSkillIndex> {
        self.ensure_leader(team_id)?;
        self.local_index(team_id)
    }

    /// Replace the cached index wholesale.
    pub fn cache_index(&self, index: &TeamSkillIndex) -> TeamResult<()> {
        let _guard = self.index_lock.lock();
        index.save(&self.storage)
    }

    /// Apply a `skill_*` event received from the leader to the cache.
    pub fn apply_skill_event(&self, event: &Event) -> TeamResult<()> {
        let payload: SkillEventPayload = event.parse_payload()?;
        match event.event_type {
            EventType::SkillPublished | EventType::SkillUpdated => {
                self.cache_entry(&event.team_id, payload.skill, &payload.plugin_id)
            }
            EventType::SkillDeleted => self.cache_entry(&event.team_id, None, &payload.plugin_id),
            _ => Ok(()),
        }
    }

    fn cache_entry(
        &self,
        team_id: &str,
        entry: Option<SkillPackageMeta>,
        plugin_id: &str,
    ) -> TeamResult<()> {
        let _guard = self.index_lock.lock();
        let mut index = TeamSkillIndex::load(&self.storage, team_id)?;
        match entry {
            Some(entry) => {
                index.add_or_update_skill(entry);
            }
            None => {
                index.remove_skill(plugin_id);
            }
        }
        index.save(&self.storage)
    }

    fn ensure_leader(&self, team_id: &str) -> TeamResult<()> {
        if self.registry.get(team_id)?.is_leader {
            Ok(())
        } else {
            Err(TeamError::NotTeamLeader(team_id.to_string()))
        }
    }

    async fn broadcast(&self, event_type: EventType, team_id: &str, payload: &SkillEventPayload) {
        match Event::new(event_type, team_id, payload) {
            Ok(event) => self.hub.broadcast(event).await,
            Err(e) => warn!(%event_type, error = %e, "Failed to build skill event"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Serving Peers
    // ═══════════════════════════════════════════════════════════════════════

    pub fn skill_meta(&self, plugin_id: &str) -> TeamResult<SkillPackageMeta> {
        self.published
            .read()
            .get(plugin_id)
            .map(|p| p.meta.clone())
            .ok_or_else(|| TeamError::SkillNotFound(plugin_id.to_string()))
    }

    /// Packed archive of a skill this node published.
    pub async fn skill_archive(&self, plugin_id: &str) -> TeamResult<Vec<u8>> {
        let path = self
            .published
            .read()
            .get(plugin_id)
            .map(|p| p.path.clone())
            .ok_or_else(|| TeamError::SkillNotFound(plugin_id.to_string()))?;
        let packed = blocking(move || packager::pack(&path)).await?;
        debug!(%plugin_id, bytes = packed.bytes.len(), "Serving skill archive");
        Ok(packed.bytes)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Downloads
    // ═══════════════════════════════════════════════════════════════════════

    /// Download a skill listed in the team index from its author.
    pub async fn download_from_index(&self, team_id: &str, plugin_id: &str) -> TeamResult<DownloadStatus> {
        let index = self.list_skills(team_id).await?;
        let entry = index
            .find_skill(plugin_id)
            .cloned()
            .ok_or_else(|| TeamError::SkillNotFound(plugin_id.to_string()))?;
        self.download(team_id, plugin_id, &entry.author_endpoint, &entry.checksum)
            .await
    }

    /// Fetch, verify and place a skill under `team-skills/{team}/{plugin}`.
    ///
    /// The archive is checked against `expected_checksum` before anything is
    /// written; on mismatch the existing copy is left untouched.
    pub async fn download(
        &self,
        team_id: &str,
        plugin_id: &str,
        author_endpoint: &str,
        expected_checksum: &str,
    ) -> TeamResult<DownloadStatus> {
        self.registry.get(team_id)?;
        validate_plugin_id(plugin_id)?;
        if expected_checksum.trim().is_empty() {
            return Err(TeamError::validation("expected checksum is required"));
        }

        let guard = self.tracker.begin(team_id, plugin_id);
        info!(%team_id, %plugin_id, %author_endpoint, "Downloading skill");

        let placed = self
            .fetch_into_place(&guard, team_id, plugin_id, author_endpoint, expected_checksum)
            .await;
        match placed {
            Ok(path) => {
                guard.complete(&path);
                info!(%plugin_id, path = %path.display(), "Skill downloaded");
            }
            Err(e) => {
                warn!(%plugin_id, error = %e, "Skill download failed");
                guard.fail(e.to_string());
                return Err(e);
            }
        }

        self.tracker
            .get(plugin_id)
            .ok_or_else(|| TeamError::SkillNotFound(plugin_id.to_string()))
    }

    async fn fetch_into_place(
        &self,
        guard: &DownloadGuard,
        team_id: &str,
        plugin_id: &str,
        author_endpoint: &str,
        expected_checksum: &str,
    ) -> TeamResult<PathBuf> {
        let bytes = self.client.download_archive(author_endpoint, plugin_id).await?;
        guard.set_progress(50);

        let target = self.download_path(team_id, plugin_id);
        let expected = expected_checksum.to_string();
        let dest = target.clone();
        blocking(move || {
            let unpacked = packager::unpack(&bytes, &expected)?;
            let staging = staging_dir_for(&dest);
            if let Err(e) = unpacked.write_to(&staging) {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
            replace_dir(&staging, &dest)
        })
        .await?;
        guard.set_progress(90);
        Ok(target)
    }

    pub fn download_status(&self, plugin_id: &str) -> Option<DownloadStatus> {
        self.tracker.get(plugin_id)
    }

    pub fn download_statuses(&self) -> Vec<DownloadStatus> {
        self.tracker.all()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Installation
    // ═══════════════════════════════════════════════════════════════════════

    pub fn check_install_conflict(&self, install_name: &str, full_id: &str) -> Option<SkillConflict> {
        self.installed
            .lock()
            .check_conflict(&self.skills_dir, install_name, full_id)
    }

    /// Install a downloaded skill into `{skills_dir}/{plugin_id}`.
    ///
    /// `force` overrides a manually installed directory of the same name but
    /// never another tracked plugin.
    pub async fn install(&self, team_id: &str, plugin_id: &str, force: bool) -> TeamResult<InstalledSkill> {
        validate_plugin_id(plugin_id)?;
        let source = self.download_path(team_id, plugin_id);
        if !source.join(SKILL_MANIFEST).is_file() {
            return Err(TeamError::SkillNotFound(plugin_id.to_string()));
        }

        let id = full_id(team_id, plugin_id);
        let name_lock = self
            .install_locks
            .lock()
            .entry(plugin_id.to_string())
            .or_default()
            .clone();
        let _installing = name_lock.lock().await;

        if let Some(conflict) = self.check_install_conflict(plugin_id, &id) {
            if !(force && conflict.is_overridable()) {
                return Err(conflict.into());
            }
            warn!(%plugin_id, conflict = %conflict.message, "Overriding install conflict");
        }

        let version = read_manifest(&source)?.version;
        let target = self.skills_dir.join(plugin_id);
        blocking(move || {
            let staging = staging_dir_for(&target);
            if let Err(e) = copy_dir(&source, &staging) {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
            replace_dir(&staging, &target)
        })
        .await?;

        let mut state = self.installed.lock();
        for stale in state.forget_stale(plugin_id, &id) {
            debug!(%stale, "Dropping install record whose directory is gone");
        }
        state.record(&id, &version);
        state.save(&self.storage)?;
        info!(%team_id, %plugin_id, %version, "Skill installed");
        state
            .get(&id)
            .cloned()
            .ok_or_else(|| TeamError::Storage(format!("install record missing for {}", id)))
    }

    /// Remove an installed team skill. A directory that is already gone
    /// counts as removed.
    pub fn uninstall(&self, team_id: &str, plugin_id: &str) -> TeamResult<()> {
        validate_plugin_id(plugin_id)?;
        let id = full_id(team_id, plugin_id);
        let mut state = self.installed.lock();
        if state.get(&id).is_none() {
            return Err(TeamError::SkillNotFound(id));
        }
        remove_dir_if_exists(&self.skills_dir.join(plugin_id))?;
        state.forget(&id);
        state.save(&self.storage)?;
        info!(%team_id, %plugin_id, "Skill uninstalled");
        Ok(())
    }

    pub fn installed(&self) -> InstalledSkillState {
        self.installed.lock().clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Rebuild in-memory state from disk after a restart.
    pub fn restore(&self) -> TeamResult<()> {
        let mut republished = 0;
        for (team_id, plugin_id, path) in skill_dirs(&self.storage.root().join(PUBLISHED_DIR)) {
            let meta = match self.local_index(&team_id)?.find_skill(&plugin_id).cloned() {
                Some(meta) => meta,
                None => self.describe(&plugin_id, &path)?,
            };
            self.published.write().insert(
                plugin_id,
                PublishedSkill {
                    team_id,
                    path,
                    meta,
                },
            );
            republished += 1;
        }

        let mut downloads = 0;
        for (team_id, plugin_id, path) in skill_dirs(&self.storage.root().join(DOWNLOADS_DIR)) {
            self.tracker.restore_completed(&team_id, &plugin_id, &path);
            downloads += 1;
        }

        let cleaned = clean_transient_dirs(&self.skills_dir);
        info!(republished, downloads, cleaned, "Skill state restored");
        Ok(())
    }

    /// Forget everything held for a team this node no longer belongs to.
    pub fn clear_team(&self, team_id: &str) -> TeamResult<()> {
        {
            let _guard = self.index_lock.lock();
            TeamSkillIndex::delete(&self.storage, team_id)?;
        }
        self.published.write().retain(|_, p| p.team_id != team_id);
        self.tracker.clear_team(team_id);
        remove_dir_if_exists(&self.storage.root().join(PUBLISHED_DIR).join(team_id))?;
        remove_dir_if_exists(&self.storage.root().join(DOWNLOADS_DIR).join(team_id))?;
        debug!(%team_id, "Cleared skill state for team");
        Ok(())
    }

    fn describe(&self, plugin_id: &str, path: &Path) -> TeamResult<SkillPackageMeta> {
        let info = read_manifest(path)?;
        let (files, total_size) = collect_files(path)?;
        let identity = self.identity.get().ok();
        Ok(SkillPackageMeta {
            plugin_id: plugin_id.to_string(),
            name: info.name,
            description: info.description,
            version: info.version,
            category: Some(info.category).filter(|c| !c.is_empty()),
            author_id: identity.as_ref().map(|i| i.id.clone()).unwrap_or_default(),
            author_name: identity.map(|i| i.name).unwrap_or_default(),
            author_endpoint: self.network.endpoint().unwrap_or_default(),
            file_count: files.len(),
            total_size,
            checksum: checksum_dir(path)?,
            published_at: now(),
        })
    }
}

/// `{root}/{team}/{plugin}` directories that contain a skill manifest.
/// Leftover staging directories are removed along the way.
fn skill_dirs(root: &Path) -> Vec<(String, String, PathBuf)> {
    let mut found = Vec::new();
    let Ok(teams) = std::fs::read_dir(root) else {
        return found;
    };
    for team in teams.flatten() {
        let team_path = team.path();
        if !team_path.is_dir() {
            continue;
        }
        clean_transient_dirs(&team_path);
        let Ok(plugins) = std::fs::read_dir(&team_path) else {
            continue;
        };
        for plugin in plugins.flatten() {
            let path = plugin.path();
            if path.join(SKILL_MANIFEST).is_file() {
                found.push((
                    team.file_name().to_string_lossy().into_owned(),
                    plugin.file_name().to_string_lossy().into_owned(),
                    path,
                ));
            }
        }
    }
    found.sort();
    found
}

fn remove_dir_if_exists(path: &Path) -> TeamResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Run filesystem-heavy work off the async runtime.
async fn blocking<T, F>(f: F) -> TeamResult<T>
where
    F: FnOnce() -> TeamResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TeamError::Storage(format!("blocking task failed: {}", e)))?
}
