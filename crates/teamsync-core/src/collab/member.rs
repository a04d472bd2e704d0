//! Member strategy: forward everything to the leader.
//!
//! Nothing is applied locally. The leader's broadcast (received over the
//! presence channel) is what updates this node's mirror, so a write the
//! leader never saw can never look applied here.

use async_trait::async_trait;
use serde_json::Value;

use crate::collab::model::*;
use crate::collab::Collaboration;
use crate::error::{TeamError, TeamResult};
use crate::team::client::MembershipClient;
use crate::team::model::MemberWorkStatus;
use crate::team::registry::TeamRegistry;

pub struct MemberCollab {
    team_id: String,
    registry: TeamRegistry,
    client: MembershipClient,
}

impl MemberCollab {
    pub fn new(team_id: &str, registry: TeamRegistry, client: MembershipClient) -> Self {
        Self {
            team_id: team_id.to_string(),
            registry,
            client,
        }
    }

    fn leader_endpoint(&self) -> TeamResult<String> {
        Ok(self.registry.get(&self.team_id)?.leader_endpoint)
    }

    fn path(&self, action: &str) -> String {
        format!("/team/{}/{}", self.team_id, action)
    }

    async fn post<B, R>(&self, action: &str, body: &B) -> TeamResult<R>
    where
        B: serde::Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let endpoint = self.leader_endpoint()?;
        self.client.forward_post(&endpoint, &self.path(action), body).await
    }

    async fn get<R: serde::de::DeserializeOwned>(&self, action: &str) -> TeamResult<R> {
        let endpoint = self.leader_endpoint()?;
        self.client.forward_get(&endpoint, &self.path(action)).await
    }
}

#[async_trait]
impl Collaboration for MemberCollab {
    fn team_id(&self) -> &str {
        &self.team_id
    }

    fn is_leader(&self) -> bool {
        false
    }

    async fn update_work_status(&self, status: MemberWorkStatus) -> TeamResult<()> {
        let _: Value = self.post("status", &status).await?;
        Ok(())
    }

    async fn share_code(&self, mut snippet: CodeSnippet) -> TeamResult<CodeSnippet> {
        snippet.normalize()?;
        self.post("share-code", &snippet).await
    }

    async fn share_daily_summary(&self, summary: TeamDailySummary) -> TeamResult<TeamDailySummary> {
        validate_date(&summary.date)?;
        self.post("daily-summaries/share", &summary).await
    }

    async fn share_session(&self, session: SharedSession) -> TeamResult<SharedSession> {
        session.validate()?;
        self.post("sessions/share", &session).await
    }

    async fn add_comment(&self, comment: SessionComment) -> TeamResult<SessionComment> {
        comment.validate()?;
        let action = format!("sessions/{}/comments", comment.share_id);
        self.post(&action, &comment).await
    }

    async fn list_sessions(&self) -> TeamResult<Vec<SharedSessionListItem>> {
        self.get("sessions").await
    }

    async fn get_session(&self, share_id: &str) -> TeamResult<SessionDetail> {
        self.get(&format!("sessions/{}", share_id)).await
    }

    async fn list_daily_summaries(&self, date: Option<&str>) -> TeamResult<Vec<TeamDailySummary>> {
        match date {
            Some(d) => {
                validate_date(d)?;
                self.get(&format!("daily-summaries?date={}", d)).await
            }
            None => self.get("daily-summaries").await,
        }
    }

    async fn get_project_config(&self) -> TeamResult<TeamProjectConfig> {
        self.get("project-config").await
    }

    async fn set_project_config(&self, _projects: Vec<ProjectEntry>) -> TeamResult<TeamProjectConfig> {
        Err(TeamError::NotTeamLeader(self.team_id.clone()))
    }

    async fn add_project(&self, _project: ProjectEntry) -> TeamResult<ProjectEntry> {
        Err(TeamError::NotTeamLeader(self.team_id.clone()))
    }

    async fn remove_project(&self, _project_id: &str) -> TeamResult<()> {
        Err(TeamError::NotTeamLeader(self.team_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::Storage;
    use crate::team::model::TeamMember;
    use crate::team::registry::sample_team;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn member_with_dead_leader(temp: &TempDir) -> MemberCollab {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap().to_string();
        drop(listener);

        let registry = TeamRegistry::load(Storage::new(temp.path()).unwrap()).unwrap();
        let mut team = sample_team("t1", false);
        team.leader_endpoint = dead;
        registry
            .install_member_team(team, vec![TeamMember::new("leader", "L", "x", true)])
            .unwrap();

        let mut config = Config::with_data_dir(temp.path());
        config.forward_timeout = Duration::from_millis(500);
        MemberCollab::new("t1", registry, MembershipClient::new(&config))
    }

    #[tokio::test]
    async fn test_set_project_config_is_leader_only() {
        let temp = TempDir::new().unwrap();
        let collab = member_with_dead_leader(&temp).await;
        // Refused locally, not LeaderUnavailable
        assert!(matches!(
            collab.set_project_config(vec![]).await,
            Err(TeamError::NotTeamLeader(_))
        ));
        assert!(matches!(
            collab.remove_project("p1").await,
            Err(TeamError::NotTeamLeader(_))
        ));
    }

    #[tokio::test]
    async fn test_leader_down_is_visible() {
        let temp = TempDir::new().unwrap();
        let collab = member_with_dead_leader(&temp).await;
        let status = WorkStatusUpdate::default().into_status(&test_identity("m1", "Ada"));
        let err = collab.update_work_status(status).await.unwrap_err();
        assert!(matches!(err, TeamError::LeaderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_snippet_never_reaches_network() {
        let temp = TempDir::new().unwrap();
        let collab = member_with_dead_leader(&temp).await;
        let mut snippet = ShareCodeRequest {
            file_name: "a.rs".into(),
            code: "x".into(),
            ..Default::default()
        }
        .into_snippet("t1", &test_identity("m1", "Ada"))
        .unwrap();
        snippet.code.clear();
        assert!(matches!(
            collab.share_code(snippet).await,
            Err(TeamError::Validation(_))
        ));
    }
}
