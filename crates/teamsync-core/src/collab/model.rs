//! Collaboration records and the local requests that produce them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TeamError, TeamResult};
use crate::identity::Identity;
use crate::team::model::MemberWorkStatus;
use crate::types::{new_id, now, Timestamp};

/// Largest code body carried by a snippet, in bytes
pub const MAX_CODE_SNIPPET_SIZE: usize = 10 * 1024;

/// Work status as carried on the wire.
pub type WorkStatusPayload = MemberWorkStatus;

/// Cut `code` to at most `max` bytes on a char boundary.
///
/// Returns the (possibly shortened) code and whether anything was cut.
pub fn truncate_code(code: &str, max: usize) -> (String, bool) {
    if code.len() <= max {
        return (code.to_string(), false);
    }
    let mut end = max;
    while !code.is_char_boundary(end) {
        end -= 1;
    }
    (code[..end].to_string(), true)
}

fn require(field: &str, value: &str) -> TeamResult<()> {
    if value.trim().is_empty() {
        Err(TeamError::validation(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Work Status
// ═══════════════════════════════════════════════════════════════════════════

/// Local API body for a work status update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkStatusUpdate {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub current_file: String,
    #[serde(default)]
    pub status_visible: bool,
}

impl WorkStatusUpdate {
    pub fn into_status(self, sender: &Identity) -> MemberWorkStatus {
        MemberWorkStatus {
            member_id: sender.id.clone(),
            member_name: sender.name.clone(),
            project_name: self.project_name,
            current_file: self.current_file,
            status_visible: self.status_visible,
            last_active_at: now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Code Snippets
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub id: String,
    pub team_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
    pub code: String,
    #[serde(default)]
    pub message: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub truncated: bool,
}

impl CodeSnippet {
    /// Reject empty code or file name, then cap the code size.
    pub fn normalize(&mut self) -> TeamResult<()> {
        if self.code.is_empty() {
            return Err(TeamError::validation("code is required"));
        }
        require("file_name", &self.file_name)?;
        let (code, cut) = truncate_code(&self.code, MAX_CODE_SNIPPET_SIZE);
        if cut {
            self.code = code;
            self.truncated = true;
        }
        Ok(())
    }
}

/// Local API body for sharing code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareCodeRequest {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ShareCodeRequest {
    /// Build a validated, size-capped snippet stamped with `sender`.
    pub fn into_snippet(self, team_id: &str, sender: &Identity) -> TeamResult<CodeSnippet> {
        let mut snippet = CodeSnippet {
            id: new_id(),
            team_id: team_id.to_string(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            file_name: self.file_name,
            file_path: self.file_path,
            language: self.language,
            start_line: self.start_line,
            end_line: self.end_line,
            code: self.code,
            message: self.message,
            created_at: now(),
            truncated: false,
        };
        snippet.normalize()?;
        Ok(snippet)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Shared Sessions
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedSession {
    pub id: String,
    pub team_id: String,
    pub sharer_id: String,
    pub sharer_name: String,
    pub session_id: String,
    pub title: String,
    /// Raw message array as exported by the sharer
    pub messages: Value,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub shared_at: Timestamp,
    #[serde(default)]
    pub comment_count: usize,
}

/// Number of entries in a raw message array; anything else counts as zero.
pub fn count_messages(messages: &Value) -> usize {
    messages.as_array().map(Vec::len).unwrap_or(0)
}

impl SharedSession {
    pub fn validate(&self) -> TeamResult<()> {
        require("session_id", &self.session_id)?;
        require("title", &self.title)?;
        match self.messages.as_array() {
            Some(list) if !list.is_empty() => Ok(()),
            _ => Err(TeamError::validation("messages is required")),
        }
    }

    pub fn to_list_item(&self) -> SharedSessionListItem {
        SharedSessionListItem {
            id: self.id.clone(),
            team_id: self.team_id.clone(),
            sharer_id: self.sharer_id.clone(),
            sharer_name: self.sharer_name.clone(),
            session_id: self.session_id.clone(),
            title: self.title.clone(),
            message_count: self.message_count,
            description: self.description.clone(),
            shared_at: self.shared_at,
            comment_count: self.comment_count,
        }
    }
}

/// A shared session without its message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedSessionListItem {
    pub id: String,
    pub team_id: String,
    pub sharer_id: String,
    pub sharer_name: String,
    pub session_id: String,
    pub title: String,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub shared_at: Timestamp,
    pub comment_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareSessionRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Value,
    #[serde(default)]
    pub description: String,
}

impl ShareSessionRequest {
    pub fn into_session(self, team_id: &str, sharer: &Identity) -> TeamResult<SharedSession> {
        let message_count = count_messages(&self.messages);
        let session = SharedSession {
            id: new_id(),
            team_id: team_id.to_string(),
            sharer_id: sharer.id.clone(),
            sharer_name: sharer.name.clone(),
            session_id: self.session_id,
            title: self.title,
            messages: self.messages,
            message_count,
            description: self.description,
            shared_at: now(),
            comment_count: 0,
        };
        session.validate()?;
        Ok(session)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionComment {
    pub id: String,
    pub share_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    pub created_at: Timestamp,
}

impl SessionComment {
    pub fn validate(&self) -> TeamResult<()> {
        require("share_id", &self.share_id)?;
        require("content", &self.content)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddCommentRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<String>,
}

impl AddCommentRequest {
    pub fn into_comment(self, share_id: &str, author: &Identity) -> TeamResult<SessionComment> {
        let comment = SessionComment {
            id: new_id(),
            share_id: share_id.to_string(),
            author_id: author.id.clone(),
            author_name: author.name.clone(),
            content: self.content,
            mentions: self.mentions,
            created_at: now(),
        };
        comment.validate()?;
        Ok(comment)
    }
}

/// A shared session with its comments, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    pub session: SharedSession,
    pub comments: Vec<SessionComment>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Daily Summaries
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDailySummary {
    pub member_id: String,
    pub member_name: String,
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(default)]
    pub project_count: u32,
    pub shared_at: Timestamp,
}

/// A summary as produced locally, before sharing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalDailySummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(default)]
    pub projects: Vec<Value>,
}

impl LocalDailySummary {
    pub fn into_shared(self, date: &str, member: &Identity) -> TeamDailySummary {
        TeamDailySummary {
            member_id: member.id.clone(),
            member_name: member.name.clone(),
            date: date.to_string(),
            summary: self.summary,
            language: self.language,
            total_sessions: self.total_sessions,
            project_count: self.projects.len() as u32,
            shared_at: now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareDailySummaryRequest {
    pub date: String,
}

/// Validate a `YYYY-MM-DD` date key.
pub fn validate_date(date: &str) -> TeamResult<()> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| TeamError::validation(format!("invalid date: {:?}", date)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Project Config
// ═══════════════════════════════════════════════════════════════════════════

/// A project the team reports on, matched against members' git remotes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    /// Assigned by the leader when left empty
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub repo_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProjectConfig {
    pub team_id: String,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
    pub updated_at: Timestamp,
}

impl TeamProjectConfig {
    pub fn empty(team_id: &str) -> Self {
        Self {
            team_id: team_id.to_string(),
            projects: Vec::new(),
            updated_at: now(),
        }
    }

    /// Give every project without an id a fresh one.
    pub fn assign_ids(&mut self) {
        for project in self.projects.iter_mut().filter(|p| p.id.is_empty()) {
            project.id = new_id();
        }
    }

    /// Insert `project`, replacing an entry with the same id or repo URL.
    pub fn add_project(&mut self, mut project: ProjectEntry) -> ProjectEntry {
        let existing = self.projects.iter_mut().find(|p| {
            (!project.id.is_empty() && p.id == project.id)
                || (!project.repo_url.is_empty() && p.repo_url == project.repo_url)
        });
        match existing {
            Some(slot) => {
                if project.id.is_empty() {
                    project.id = slot.id.clone();
                }
                *slot = project.clone();
            }
            None => {
                if project.id.is_empty() {
                    project.id = new_id();
                }
                self.projects.push(project.clone());
            }
        }
        self.updated_at = now();
        project
    }

    pub fn remove_project(&mut self, project_id: &str) -> TeamResult<ProjectEntry> {
        let pos = self
            .projects
            .iter()
            .position(|p| p.id == project_id)
            .ok_or_else(|| TeamError::ProjectNotFound(project_id.to_string()))?;
        self.updated_at = now();
        Ok(self.projects.remove(pos))
    }

    /// Repo URLs of every configured project that has one.
    pub fn repo_urls(&self) -> Vec<String> {
        self.projects
            .iter()
            .filter(|p| !p.repo_url.is_empty())
            .map(|p| p.repo_url.clone())
            .collect()
    }
}

/// Body of `POST .../project-config/projects`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddProjectRequest {
    pub name: String,
    #[serde(default)]
    pub repo_url: String,
}

impl AddProjectRequest {
    pub fn into_entry(self) -> TeamResult<ProjectEntry> {
        require("project name", &self.name)?;
        Ok(ProjectEntry {
            id: String::new(),
            name: self.name.trim().to_string(),
            repo_url: self.repo_url.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetProjectConfigRequest {
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

impl SetProjectConfigRequest {
    pub fn validate(&self) -> TeamResult<()> {
        for p in &self.projects {
            require("project name", &p.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_identity(id: &str, name: &str) -> Identity {
    Identity {
        id: id.to_string(),
        name: name.to_string(),
        created_at: now(),
        updated_at: now(),
    }
}
