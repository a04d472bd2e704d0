//! Leader strategy: mutate the canonical stores, then broadcast.
//!
//! Every store change is applied to a copy and persisted before it replaces
//! the in-memory state, so a failed write leaves memory and disk agreeing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collab::model::*;
use crate::collab::store::{load_project_config, save_project_config, DailySummaryIndex, SessionBook};
use crate::collab::Collaboration;
use crate::error::{TeamError, TeamResult};
use crate::presence::events::{Event, EventType};
use crate::presence::hub::PresenceHub;
use crate::storage::Storage;
use crate::team::model::MemberWorkStatus;
use crate::team::registry::TeamRegistry;
use crate::types::now;

pub struct LeaderCollab {
    team_id: String,
    storage: Storage,
    registry: TeamRegistry,
    hub: PresenceHub,
    sessions: Mutex<SessionBook>,
    summaries: Mutex<DailySummaryIndex>,
    project_config: Mutex<TeamProjectConfig>,
}

impl LeaderCollab {
    /// Load the team's canonical stores.
    pub fn load(
        team_id: &str,
        storage: Storage,
        registry: TeamRegistry,
        hub: PresenceHub,
    ) -> TeamResult<Self> {
        let sessions = SessionBook::load(&storage, team_id)?;
        let summaries = DailySummaryIndex::load(&storage, team_id)?;
        let project_config = load_project_config(&storage, team_id)?;
        Ok(Self {
            team_id: team_id.to_string(),
            storage,
            registry,
            hub,
            sessions: Mutex::new(sessions),
            summaries: Mutex::new(summaries),
            project_config: Mutex::new(project_config),
        })
    }

    fn ensure_member(&self, member_id: &str) -> TeamResult<()> {
        if self.registry.is_member(member_id) {
            Ok(())
        } else {
            Err(TeamError::NotTeamMember(member_id.to_string()))
        }
    }

    /// Apply `change` to a copy of `slot`, persist the copy with `save`, then
    /// make it current.
    fn commit<T: Clone, R>(
        slot: &Mutex<T>,
        change: impl FnOnce(&mut T) -> TeamResult<R>,
        save: impl FnOnce(&T) -> TeamResult<()>,
    ) -> TeamResult<R> {
        let mut current = slot.lock();
        let mut next = current.clone();
        let out = change(&mut next)?;
        save(&next)?;
        *current = next;
        Ok(out)
    }

    async fn broadcast<P: Serialize>(&self, event_type: EventType, payload: &P) {
        match Event::new(event_type, &self.team_id, payload) {
            Ok(event) => self.hub.broadcast(event).await,
            Err(e) => warn!(%event_type, error = %e, "Failed to build broadcast event"),
        }
    }
}

#[async_trait]
impl Collaboration for LeaderCollab {
    fn team_id(&self) -> &str {
        &self.team_id
    }

    fn is_leader(&self) -> bool {
        true
    }

    async fn update_work_status(&self, status: MemberWorkStatus) -> TeamResult<()> {
        if !self.registry.set_work_status(status.clone())? {
            return Err(TeamError::NotTeamMember(status.member_id));
        }
        debug!(member_id = %status.member_id, project = %status.project_name, "Work status updated");
        self.broadcast(EventType::MemberStatusChanged, &status).await;
        Ok(())
    }

    async fn share_code(&self, mut snippet: CodeSnippet) -> TeamResult<CodeSnippet> {
        self.ensure_member(&snippet.sender_id)?;
        snippet.normalize()?;
        snippet.team_id = self.team_id.clone();
        info!(sender = %snippet.sender_name, file = %snippet.file_name, "Code shared");
        self.broadcast(EventType::CodeShared, &snippet).await;
        Ok(snippet)
    }

    async fn share_daily_summary(&self, summary: TeamDailySummary) -> TeamResult<TeamDailySummary> {
        self.ensure_member(&summary.member_id)?;
        validate_date(&summary.date)?;
        Self::commit(
            &self.summaries,
            |index| {
                index.add_or_update(summary.clone());
                Ok(())
            },
            |index| index.save(&self.storage),
        )?;
        info!(member = %summary.member_name, date = %summary.date, "Daily summary shared");
        self.broadcast(EventType::DailySummaryShared, &summary).await;
        Ok(summary)
    }

    async fn share_session(&self, session: SharedSession) -> TeamResult<SharedSession> {
        self.ensure_member(&session.sharer_id)?;
        session.validate()?;
        let mut session = session;
        session.team_id = self.team_id.clone();
        let stored = Self::commit(
            &self.sessions,
            |book| Ok(book.add_session(session)),
            |book| book.save(&self.storage, &self.team_id),
        )?;
        info!(share_id = %stored.id, title = %stored.title, "Session shared");
        self.broadcast(EventType::SessionShared, &stored.to_list_item())
            .await;
        Ok(stored)
    }

    async fn add_comment(&self, comment: SessionComment) -> TeamResult<SessionComment> {
        self.ensure_member(&comment.author_id)?;
        comment.validate()?;
        let stored = Self::commit(
            &self.sessions,
            |book| book.add_comment(comment),
            |book| book.save(&self.storage, &self.team_id),
        )?;
        debug!(share_id = %stored.share_id, author = %stored.author_name, "Comment added");
        self.broadcast(EventType::CommentAdded, &stored).await;
        Ok(stored)
    }

    async fn list_sessions(&self) -> TeamResult<Vec<SharedSessionListItem>> {
        Ok(self.sessions.lock().list())
    }

    async fn get_session(&self, share_id: &str) -> TeamResult<SessionDetail> {
        self.sessions.lock().detail(share_id)
    }

    async fn list_daily_summaries(&self, date: Option<&str>) -> TeamResult<Vec<TeamDailySummary>> {
        if let Some(d) = date {
            validate_date(d)?;
        }
        Ok(self.summaries.lock().list(date))
    }

    async fn get_project_config(&self) -> TeamResult<TeamProjectConfig> {
        Ok(self.project_config.lock().clone())
    }

    async fn set_project_config(&self, projects: Vec<ProjectEntry>) -> TeamResult<TeamProjectConfig> {
        SetProjectConfigRequest {
            projects: projects.clone(),
        }
        .validate()?;
        let config = Self::commit(
            &self.project_config,
            |current| {
                current.projects = projects;
                current.assign_ids();
                current.updated_at = now();
                Ok(current.clone())
            },
            |current| save_project_config(&self.storage, current),
        )?;
        info!(projects = config.projects.len(), "Project config updated");
        self.broadcast(EventType::ProjectConfigUpdated, &config).await;
        Ok(config)
    }

    async fn add_project(&self, project: ProjectEntry) -> TeamResult<ProjectEntry> {
        let (added, config) = Self::commit(
            &self.project_config,
            |current| {
                let added = current.add_project(project);
                Ok((added, current.clone()))
            },
            |current| save_project_config(&self.storage, current),
        )?;
        info!(project = %added.name, id = %added.id, "Project added");
        self.broadcast(EventType::ProjectConfigUpdated, &config).await;
        Ok(added)
    }

    async fn remove_project(&self, project_id: &str) -> TeamResult<()> {
        let config = Self::commit(
            &self.project_config,
            |current| {
                current.remove_project(project_id)?;
                Ok(current.clone())
            },
            |current| save_project_config(&self.storage, current),
        )?;
        info!(%project_id, "Project removed");
        self.broadcast(EventType::ProjectConfigUpdated, &config).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::model::TeamMember;
    use crate::storage::{daily_summary_index_file, project_config_file, sessions_file};
    use crate::team::registry::sample_team;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        collab: LeaderCollab,
        hub: PresenceHub,
        storage: Storage,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path()).unwrap();
        let registry = TeamRegistry::load(storage.clone()).unwrap();
        registry
            .install_leader_team(
                sample_team("t1", true),
                TeamMember::new("leader", "Leader", "127.0.0.1:1", true),
            )
            .unwrap();
        registry
            .upsert_member(TeamMember::new("m1", "Ada", "127.0.0.1:2", false))
            .unwrap();
        let hub = PresenceHub::spawn();
        let collab = LeaderCollab::load("t1", storage.clone(), registry, hub.clone()).unwrap();
        Fixture {
            _temp: temp,
            collab,
            hub,
            storage,
        }
    }

    #[tokio::test]
    async fn test_work_status_applies_and_broadcasts() {
        let f = fixture();
        let mut conn = f.hub.register("m2").await;

        let status = WorkStatusUpdate {
            project_name: "P".into(),
            current_file: "f.go".into(),
            status_visible: true,
        }
        .into_status(&test_identity("m1", "Ada"));
        f.collab.update_work_status(status).await.unwrap();

        let event = conn.receiver.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::MemberStatusChanged);
        let payload: MemberWorkStatus = event.parse_payload().unwrap();
        assert_eq!(payload.project_name, "P");
        assert_eq!(
            f.collab.registry.member("m1").unwrap().work_status.unwrap().current_file,
            "f.go"
        );
    }

    #[tokio::test]
    async fn test_unknown_sender_rejected() {
        let f = fixture();
        let snippet = ShareCodeRequest {
            file_name: "a.rs".into(),
            code: "x".into(),
            ..Default::default()
        }
        .into_snippet("t1", &test_identity("stranger", "S"))
        .unwrap();
        assert!(matches!(
            f.collab.share_code(snippet).await,
            Err(TeamError::NotTeamMember(_))
        ));
    }

    #[tokio::test]
    async fn test_sessions_and_comments_persist() {
        let f = fixture();
        let session = ShareSessionRequest {
            session_id: "s1".into(),
            title: "Pairing".into(),
            messages: serde_json::json!(["a"]),
            description: String::new(),
        }
        .into_session("t1", &test_identity("m1", "Ada"))
        .unwrap();
        let stored = f.collab.share_session(session).await.unwrap();

        let comment = AddCommentRequest {
            content: "+1".into(),
            mentions: vec![],
        }
        .into_comment(&stored.id, &test_identity("leader", "Leader"))
        .unwrap();
        f.collab.add_comment(comment).await.unwrap();

        let list = f.collab.list_sessions().await.unwrap();
        assert_eq!(list[0].comment_count, 1);

        let reloaded = SessionBook::load(&f.storage, "t1").unwrap();
        assert_eq!(reloaded.detail(&stored.id).unwrap().comments.len(), 1);
    }

    /// Block writes to `name` by putting a non-empty directory in its place.
    fn jam(storage: &Storage, name: &str) {
        let path = storage.root().join(name);
        std::fs::create_dir_all(path.join("blocker")).unwrap();
    }

    fn pairing_session() -> SharedSession {
        ShareSessionRequest {
            session_id: "s1".into(),
            title: "Pairing".into(),
            messages: serde_json::json!(["a", "b"]),
            description: String::new(),
        }
        .into_session("t1", &test_identity("m1", "Ada"))
        .unwrap()
    }

    #[tokio::test]
    async fn test_leader_assigns_session_fields() {
        let f = fixture();
        let mut forged = pairing_session();
        forged.id = "picked-by-member".into();
        forged.message_count = 1_000;

        let stored = f.collab.share_session(forged).await.unwrap();
        assert_ne!(stored.id, "picked-by-member");
        assert_eq!(stored.message_count, 2);
        assert!(f.collab.get_session("picked-by-member").await.is_err());
        assert_eq!(f.collab.get_session(&stored.id).await.unwrap().session.message_count, 2);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_memory_unchanged() {
        let f = fixture();
        let stored = f.collab.share_session(pairing_session()).await.unwrap();

        std::fs::remove_file(f.storage.root().join(sessions_file("t1"))).unwrap();
        jam(&f.storage, &sessions_file("t1"));
        jam(&f.storage, &daily_summary_index_file("t1"));
        jam(&f.storage, &project_config_file("t1"));

        assert!(f.collab.share_session(pairing_session()).await.is_err());
        let comment = AddCommentRequest {
            content: "+1".into(),
            mentions: vec![],
        }
        .into_comment(&stored.id, &test_identity("leader", "Leader"))
        .unwrap();
        assert!(f.collab.add_comment(comment).await.is_err());
        let summary = LocalDailySummary::default().into_shared("2026-10-19", &test_identity("m1", "Ada"));
        assert!(f.collab.share_daily_summary(summary).await.is_err());
        assert!(f
            .collab
            .set_project_config(vec![ProjectEntry {
                id: String::new(),
                name: "api".into(),
                repo_url: String::new(),
            }])
            .await
            .is_err());

        let list = f.collab.list_sessions().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].comment_count, 0);
        assert!(f.collab.list_daily_summaries(None).await.unwrap().is_empty());
        assert!(f.collab.get_project_config().await.unwrap().projects.is_empty());
    }

    #[tokio::test]
    async fn test_project_config() {
        let f = fixture();
        let config = f
            .collab
            .set_project_config(vec![ProjectEntry {
                id: String::new(),
                name: "api".into(),
                repo_url: "git@example.com:api.git".into(),
            }])
            .await
            .unwrap();
        assert_eq!(config.projects.len(), 1);
        assert!(!config.projects[0].id.is_empty());
        assert_eq!(f.collab.get_project_config().await.unwrap(), config);
        assert_eq!(load_project_config(&f.storage, "t1").unwrap(), config);
    }

    #[tokio::test]
    async fn test_add_and_remove_project() {
        let f = fixture();
        let mut conn = f.hub.register("m1").await;

        let added = f
            .collab
            .add_project(AddProjectRequest {
                name: "api".into(),
                repo_url: "github.com/acme/api".into(),
            }
            .into_entry()
            .unwrap())
            .await
            .unwrap();
        assert!(!added.id.is_empty());
        let event = conn.receiver.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::ProjectConfigUpdated);

        // Same repo again renames in place
        let renamed = f
            .collab
            .add_project(AddProjectRequest {
                name: "API".into(),
                repo_url: "github.com/acme/api".into(),
            }
            .into_entry()
            .unwrap())
            .await
            .unwrap();
        assert_eq!(renamed.id, added.id);
        let config = f.collab.get_project_config().await.unwrap();
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.projects[0].name, "API");

        f.collab.remove_project(&added.id).await.unwrap();
        assert!(load_project_config(&f.storage, "t1").unwrap().projects.is_empty());
        assert!(matches!(
            f.collab.remove_project(&added.id).await,
            Err(TeamError::ProjectNotFound(_))
        ));
    }
}
