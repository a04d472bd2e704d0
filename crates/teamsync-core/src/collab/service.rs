//! Local entry point for collaboration.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::collab::model::*;
use crate::collab::store::DailySummaryStore;
use crate::collab::Collaboration;
use crate::error::{TeamError, TeamResult};
use crate::identity::IdentityStore;
use crate::team::model::MemberWorkStatus;

/// Builds records from the local identity and hands them to the strategy
/// selected for the current role.
#[derive(Clone)]
pub struct CollaborationService {
    identity: IdentityStore,
    local_summaries: Arc<dyn DailySummaryStore>,
    strategy: Arc<RwLock<Option<Arc<dyn Collaboration>>>>,
}

impl CollaborationService {
    pub fn new(identity: IdentityStore, local_summaries: Arc<dyn DailySummaryStore>) -> Self {
        Self {
            identity,
            local_summaries,
            strategy: Arc::new(RwLock::new(None)),
        }
    }

    /// Install the strategy for a newly established role.
    pub fn select(&self, strategy: Arc<dyn Collaboration>) {
        info!(
            team_id = %strategy.team_id(),
            leader = strategy.is_leader(),
            "Collaboration strategy selected"
        );
        *self.strategy.write() = Some(strategy);
    }

    pub fn clear(&self) {
        *self.strategy.write() = None;
    }

    /// Strategy for `team_id`.
    pub fn strategy(&self, team_id: &str) -> TeamResult<Arc<dyn Collaboration>> {
        self.strategy
            .read()
            .as_ref()
            .filter(|s| s.team_id() == team_id)
            .cloned()
            .ok_or_else(|| TeamError::TeamNotFound(team_id.to_string()))
    }

    /// Leader strategy for `team_id`, as used to serve forwarded requests.
    pub fn leader(&self, team_id: &str) -> TeamResult<Arc<dyn Collaboration>> {
        let strategy = self.strategy(team_id)?;
        if strategy.is_leader() {
            Ok(strategy)
        } else {
            Err(TeamError::NotTeamLeader(team_id.to_string()))
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn update_work_status(
        &self,
        team_id: &str,
        update: WorkStatusUpdate,
    ) -> TeamResult<MemberWorkStatus> {
        let status = update.into_status(&self.identity.get()?);
        self.strategy(team_id)?
            .update_work_status(status.clone())
            .await?;
        Ok(status)
    }

    pub async fn share_code(&self, team_id: &str, request: ShareCodeRequest) -> TeamResult<CodeSnippet> {
        let snippet = request.into_snippet(team_id, &self.identity.get()?)?;
        self.strategy(team_id)?.share_code(snippet).await
    }

    /// Share this node's summary for `date`, read from the local store.
    pub async fn share_daily_summary(&self, team_id: &str, date: &str) -> TeamResult<TeamDailySummary> {
        validate_date(date)?;
        let identity = self.identity.get()?;
        let strategy = self.strategy(team_id)?;
        let local = self.local_summaries.summary_for(date)?.ok_or_else(|| {
            TeamError::validation(format!(
                "no daily summary found for date {}, generate it first",
                date
            ))
        })?;
        strategy
            .share_daily_summary(local.into_shared(date, &identity))
            .await
    }

    pub async fn share_session(
        &self,
        team_id: &str,
        request: ShareSessionRequest,
    ) -> TeamResult<SharedSession> {
        let session = request.into_session(team_id, &self.identity.get()?)?;
        self.strategy(team_id)?.share_session(session).await
    }

    pub async fn add_comment(
        &self,
        team_id: &str,
        share_id: &str,
        request: AddCommentRequest,
    ) -> TeamResult<SessionComment> {
        let comment = request.into_comment(share_id, &self.identity.get()?)?;
        self.strategy(team_id)?.add_comment(comment).await
    }

    pub async fn set_project_config(
        &self,
        team_id: &str,
        request: SetProjectConfigRequest,
    ) -> TeamResult<TeamProjectConfig> {
        let strategy = self.strategy(team_id)?;
        if !strategy.is_leader() {
            return Err(TeamError::NotTeamLeader(team_id.to_string()));
        }
        request.validate()?;
        strategy.set_project_config(request.projects).await
    }

    pub async fn add_project(&self, team_id: &str, request: AddProjectRequest) -> TeamResult<ProjectEntry> {
        let entry = request.into_entry()?;
        self.leader(team_id)?.add_project(entry).await
    }

    pub async fn remove_project(&self, team_id: &str, project_id: &str) -> TeamResult<()> {
        self.leader(team_id)?.remove_project(project_id).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn list_sessions(&self, team_id: &str) -> TeamResult<Vec<SharedSessionListItem>> {
        self.strategy(team_id)?.list_sessions().await
    }

    pub async fn get_session(&self, team_id: &str, share_id: &str) -> TeamResult<SessionDetail> {
        self.strategy(team_id)?.get_session(share_id).await
    }

    pub async fn list_daily_summaries(
        &self,
        team_id: &str,
        date: Option<&str>,
    ) -> TeamResult<Vec<TeamDailySummary>> {
        self.strategy(team_id)?.list_daily_summaries(date).await
    }

    pub async fn get_project_config(&self, team_id: &str) -> TeamResult<TeamProjectConfig> {
        self.strategy(team_id)?.get_project_config().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::store::FileDailySummaryStore;
    use crate::collab::LeaderCollab;
    use crate::presence::hub::PresenceHub;
    use crate::storage::Storage;
    use crate::team::model::TeamMember;
    use crate::team::registry::{sample_team, TeamRegistry};
    use tempfile::TempDir;

    fn leader_service(temp: &TempDir) -> CollaborationService {
        let storage = Storage::new(temp.path()).unwrap();
        let identity = IdentityStore::load(storage.clone()).unwrap();
        let me = identity.create("Leader").unwrap();

        let registry = TeamRegistry::load(storage.clone()).unwrap();
        registry
            .install_leader_team(
                sample_team("t1", true),
                TeamMember::new(&me.id, &me.name, "127.0.0.1:1", true),
            )
            .unwrap();

        let summaries = FileDailySummaryStore::new(temp.path().join("daily-summaries"));
        let service = CollaborationService::new(identity, Arc::new(summaries));
        let leader = LeaderCollab::load("t1", storage, registry, PresenceHub::spawn()).unwrap();
        service.select(Arc::new(leader));
        service
    }

    #[tokio::test]
    async fn test_no_strategy_is_team_not_found() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path()).unwrap();
        let service = CollaborationService::new(
            IdentityStore::load(storage).unwrap(),
            Arc::new(FileDailySummaryStore::new(temp.path())),
        );
        assert!(matches!(
            service.list_sessions("t1").await,
            Err(TeamError::TeamNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_share_code_stamps_identity() {
        let temp = TempDir::new().unwrap();
        let service = leader_service(&temp);
        let snippet = service
            .share_code(
                "t1",
                ShareCodeRequest {
                    file_name: "lib.rs".into(),
                    code: "pub fn x() {}".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(snippet.sender_name, "Leader");
        assert!(service.leader("t1").is_ok());
    }

    #[tokio::test]
    async fn test_share_daily_summary_reads_local_store() {
        let temp = TempDir::new().unwrap();
        let service = leader_service(&temp);

        let missing = service.share_daily_summary("t1", "2026-10-19").await;
        assert!(matches!(missing, Err(TeamError::Validation(_))));

        std::fs::create_dir_all(temp.path().join("daily-summaries")).unwrap();
        std::fs::write(
            temp.path().join("daily-summaries/2026-10-19.json"),
            r#"{"summary":"done","total_sessions":2}"#,
        )
        .unwrap();
        let shared = service.share_daily_summary("t1", "2026-10-19").await.unwrap();
        assert_eq!(shared.total_sessions, 2);

        let listed = service
            .list_daily_summaries("t1", Some("2026-10-19"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
