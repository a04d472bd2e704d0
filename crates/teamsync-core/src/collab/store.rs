//! Leader-side canonical collaboration stores, plus the local daily
//! summary source.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::collab::model::{
    count_messages, validate_date, LocalDailySummary, SessionComment, SessionDetail, SharedSession,
    SharedSessionListItem, TeamDailySummary, TeamProjectConfig,
};
use crate::error::{TeamError, TeamResult};
use crate::storage::{
    daily_summary_index_file, project_config_file, sessions_file, weekly_stats_cache_file, Storage,
};
use crate::types::{new_id, now, Timestamp};

// ═══════════════════════════════════════════════════════════════════════════
// Shared Sessions
// ═══════════════════════════════════════════════════════════════════════════

/// Contents of `sessions/{team}.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionBook {
    #[serde(default)]
    pub sessions: Vec<SharedSession>,
    #[serde(default)]
    pub comments: Vec<SessionComment>,
}

impl SessionBook {
    pub fn load(storage: &Storage, team_id: &str) -> TeamResult<Self> {
        Ok(storage.read_json(&sessions_file(team_id))?.unwrap_or_default())
    }

    pub fn save(&self, storage: &Storage, team_id: &str) -> TeamResult<()> {
        storage.write_json(&sessions_file(team_id), self)
    }

    /// Store a session under a fresh id. Id, counts and timestamp supplied
    /// by the sharer are replaced.
    pub fn add_session(&mut self, mut session: SharedSession) -> SharedSession {
        session.id = new_id();
        session.message_count = count_messages(&session.messages);
        session.comment_count = 0;
        session.shared_at = now();
        self.sessions.push(session.clone());
        session
    }

    /// Attach a comment under a fresh id and bump the session's comment count.
    pub fn add_comment(&mut self, mut comment: SessionComment) -> TeamResult<SessionComment> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == comment.share_id)
            .ok_or_else(|| TeamError::SessionNotFound(comment.share_id.clone()))?;
        session.comment_count += 1;
        comment.id = new_id();
        comment.created_at = now();
        self.comments.push(comment.clone());
        Ok(comment)
    }

    /// Newest first.
    pub fn list(&self) -> Vec<SharedSessionListItem> {
        let mut items: Vec<_> = self.sessions.iter().map(SharedSession::to_list_item).collect();
        items.sort_by(|a, b| b.shared_at.cmp(&a.shared_at));
        items
    }

    pub fn detail(&self, share_id: &str) -> TeamResult<SessionDetail> {
        let session = self
            .sessions
            .iter()
            .find(|s| s.id == share_id)
            .cloned()
            .ok_or_else(|| TeamError::SessionNotFound(share_id.to_string()))?;
        let mut comments: Vec<_> = self
            .comments
            .iter()
            .filter(|c| c.share_id == share_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(SessionDetail { session, comments })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Daily Summary Index
// ═══════════════════════════════════════════════════════════════════════════

/// Contents of `daily-summary-index/{team}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryIndex {
    pub team_id: String,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub summaries: Vec<TeamDailySummary>,
}

impl DailySummaryIndex {
    pub fn load(storage: &Storage, team_id: &str) -> TeamResult<Self> {
        Ok(storage
            .read_json(&daily_summary_index_file(team_id))?
            .unwrap_or_else(|| Self {
                team_id: team_id.to_string(),
                updated_at: now(),
                summaries: Vec::new(),
            }))
    }

    pub fn save(&self, storage: &Storage) -> TeamResult<()> {
        storage.write_json(&daily_summary_index_file(&self.team_id), self)
    }

    /// One entry per (date, member); resharing replaces it.
    pub fn add_or_update(&mut self, entry: TeamDailySummary) {
        self.updated_at = now();
        match self
            .summaries
            .iter_mut()
            .find(|s| s.date == entry.date && s.member_id == entry.member_id)
        {
            Some(existing) => *existing = entry,
            None => self.summaries.push(entry),
        }
    }

    /// Summaries for `date`, or all of them, newest date first.
    pub fn list(&self, date: Option<&str>) -> Vec<TeamDailySummary> {
        let mut out: Vec<_> = self
            .summaries
            .iter()
            .filter(|s| date.map_or(true, |d| s.date == d))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(a.member_name.cmp(&b.member_name)));
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Project Config
// ═══════════════════════════════════════════════════════════════════════════

pub fn load_project_config(storage: &Storage, team_id: &str) -> TeamResult<TeamProjectConfig> {
    Ok(storage
        .read_json(&project_config_file(team_id))?
        .unwrap_or_else(|| TeamProjectConfig::empty(team_id)))
}

pub fn save_project_config(storage: &Storage, config: &TeamProjectConfig) -> TeamResult<()> {
    storage.write_json(&project_config_file(&config.team_id), config)
}

/// Drop every leader-side collaboration file of a team.
pub fn remove_team_files(storage: &Storage, team_id: &str) -> TeamResult<()> {
    storage.remove(&sessions_file(team_id))?;
    storage.remove(&daily_summary_index_file(team_id))?;
    storage.remove(&weekly_stats_cache_file(team_id))?;
    storage.remove(&project_config_file(team_id))
}

// ═══════════════════════════════════════════════════════════════════════════
// Local Daily Summaries
// ═══════════════════════════════════════════════════════════════════════════

/// Source of this node's own daily summaries
pub trait DailySummaryStore: Send + Sync {
    fn summary_for(&self, date: &str) -> TeamResult<Option<LocalDailySummary>>;
}

/// Reads `{dir}/{date}.json`
pub struct FileDailySummaryStore {
    dir: PathBuf,
}

impl FileDailySummaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DailySummaryStore for FileDailySummaryStore {
    fn summary_for(&self, date: &str) -> TeamResult<Option<LocalDailySummary>> {
        validate_date(date)?;
        let path = self.dir.join(format!("{}.json", date));
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
