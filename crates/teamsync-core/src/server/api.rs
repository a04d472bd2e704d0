//! Local API (`/api/v1`) used by the CLI and the desktop shell.
//!
//! Payloads are built from the local identity here and handed to whichever
//! collaboration strategy the node's role selected.

use std::path::PathBuf;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::collab::{
    AddCommentRequest, AddProjectRequest, CodeSnippet, ProjectEntry, SessionComment, SessionDetail, SetProjectConfigRequest,
    ShareCodeRequest, ShareDailySummaryRequest, ShareSessionRequest, SharedSession,
    SharedSessionListItem, TeamDailySummary, TeamProjectConfig, WorkStatusUpdate,
};
use crate::error::{TeamError, TeamResult};
use crate::identity::Identity;
use crate::network::{discover, DiscoveredTeam, MemberEndpoint, NetworkConfig, NetworkInterface};
use crate::report::{MemberDailyDetail, RefreshOutcome, TeamWeeklyView};
use crate::server::{Ack, AppState, DateQuery, HealthResponse};
use crate::skill::manifest::SkillMetadata;
use crate::skill::{
    DownloadStatus, InstalledSkill, InstalledSkillEntry, SkillPackageMeta, TeamSkillIndex, ValidationResult,
};
use crate::team::{CreateTeamRequest, JoinTeamRequest, MemberWorkStatus, Team, TeamMember};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/identity", get(get_identity).post(set_identity))
        .route("/network", get(get_network).post(set_network))
        .route("/network/interfaces", get(list_interfaces))
        .route("/teams", get(list_teams).post(create_team))
        .route("/teams/discover", get(discover_teams))
        .route("/teams/join", post(join_team))
        .route("/teams/{team_id}/members", get(team_members))
        .route("/teams/{team_id}/leave", post(leave_team))
        .route("/teams/{team_id}/dissolve", post(dissolve_team))
        .route("/teams/{team_id}/status", post(update_status))
        .route("/teams/{team_id}/share-code", post(share_code))
        .route("/teams/{team_id}/daily-summaries/share", post(share_daily_summary))
        .route("/teams/{team_id}/daily-summaries", get(list_daily_summaries))
        .route("/teams/{team_id}/sessions", get(list_sessions).post(share_session))
        .route("/teams/{team_id}/sessions/{share_id}", get(get_session))
        .route("/teams/{team_id}/sessions/{share_id}/comments", post(add_comment))
        .route(
            "/teams/{team_id}/project-config",
            get(get_project_config).post(set_project_config),
        )
        .route("/teams/{team_id}/project-config/projects", post(add_project))
        .route(
            "/teams/{team_id}/project-config/projects/{project_id}",
            axum::routing::delete(remove_project),
        )
        .route("/teams/{team_id}/weekly-report", get(weekly_report))
        .route("/teams/{team_id}/weekly-report/refresh", post(refresh_weekly_report))
        .route(
            "/teams/{team_id}/members/{member_id}/daily-detail",
            get(member_daily_detail),
        )
        .route("/skills/validate", post(validate_skill))
        .route("/skills/installed", get(installed_skills))
        .route("/teams/{team_id}/skills", get(list_skills).post(publish_skill))
        .route(
            "/teams/{team_id}/skills/{plugin_id}",
            axum::routing::delete(unpublish_skill),
        )
        .route("/teams/{team_id}/skills/{plugin_id}/download", post(download_skill))
        .route(
            "/teams/{team_id}/skills/{plugin_id}/install",
            post(install_skill).delete(uninstall_skill),
        )
        .route("/downloads", get(downloads))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetIdentityRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetNetworkRequest {
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Current preference plus what it resolves to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub config: NetworkConfig,
    pub endpoint: Option<String>,
    pub port: u16,
    /// Every address this node could be reached on
    pub addresses: Option<MemberEndpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoverQuery {
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillPathRequest {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSkillRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub metadata: Option<SkillMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallQuery {
    #[serde(default)]
    pub force: bool,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

// ═══════════════════════════════════════════════════════════════════════════
// Identity & Network
// ═══════════════════════════════════════════════════════════════════════════

async fn get_identity(State(state): State<AppState>) -> TeamResult<Json<Identity>> {
    state.identity.get().map(Json)
}

async fn set_identity(
    State(state): State<AppState>,
    Json(request): Json<SetIdentityRequest>,
) -> TeamResult<Json<Identity>> {
    let identity = if state.identity.is_set() {
        state.identity.update(&request.name)?
    } else {
        state.identity.create(&request.name)?
    };
    Ok(Json(identity))
}

fn network_status(state: &AppState) -> NetworkStatus {
    NetworkStatus {
        config: state.network.config(),
        endpoint: state.network.endpoint().ok(),
        port: state.network.port(),
        addresses: state.network.member_endpoint().ok(),
    }
}

async fn get_network(State(state): State<AppState>) -> Json<NetworkStatus> {
    Json(network_status(&state))
}

async fn set_network(
    State(state): State<AppState>,
    Json(request): Json<SetNetworkRequest>,
) -> TeamResult<Json<NetworkStatus>> {
    state.network.set_config(request.interface, request.ip)?;
    Ok(Json(network_status(&state)))
}

async fn list_interfaces(State(state): State<AppState>) -> TeamResult<Json<Vec<NetworkInterface>>> {
    state.network.interfaces().map(Json)
}

async fn discover_teams(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> TeamResult<Json<Vec<DiscoveredTeam>>> {
    let timeout = query
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(state.config.discovery_timeout);
    discover(timeout).await.map(Json)
}

// ═══════════════════════════════════════════════════════════════════════════
// Teams
// ═══════════════════════════════════════════════════════════════════════════

async fn list_teams(State(state): State<AppState>) -> Json<Vec<Team>> {
    Json(state.teams.list_teams())
}

async fn create_team(
    State(state): State<AppState>,
    Json(request): Json<CreateTeamRequest>,
) -> TeamResult<Json<Team>> {
    state.teams.create_team(request).await.map(Json)
}

async fn join_team(
    State(state): State<AppState>,
    Json(request): Json<JoinTeamRequest>,
) -> TeamResult<Json<Team>> {
    state.teams.join_team(&request.endpoint).await.map(Json)
}

async fn team_members(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<Vec<TeamMember>>> {
    state.teams.get_team_members(&team_id).await.map(Json)
}

async fn leave_team(State(state): State<AppState>, Path(team_id): Path<String>) -> TeamResult<Json<Ack>> {
    state.teams.leave_team(&team_id).await?;
    Ok(Json(Ack::OK))
}

async fn dissolve_team(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<Ack>> {
    state.teams.dissolve_team(&team_id).await?;
    Ok(Json(Ack::OK))
}

// ═══════════════════════════════════════════════════════════════════════════
// Collaboration
// ═══════════════════════════════════════════════════════════════════════════

async fn update_status(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(update): Json<WorkStatusUpdate>,
) -> TeamResult<Json<MemberWorkStatus>> {
    state.collab.update_work_status(&team_id, update).await.map(Json)
}

async fn share_code(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<ShareCodeRequest>,
) -> TeamResult<Json<CodeSnippet>> {
    state.collab.share_code(&team_id, request).await.map(Json)
}

async fn share_daily_summary(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<ShareDailySummaryRequest>,
) -> TeamResult<Json<TeamDailySummary>> {
    state
        .collab
        .share_daily_summary(&team_id, &request.date)
        .await
        .map(Json)
}

async fn list_daily_summaries(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> TeamResult<Json<Vec<TeamDailySummary>>> {
    state
        .collab
        .list_daily_summaries(&team_id, query.date.as_deref())
        .await
        .map(Json)
}

async fn share_session(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<ShareSessionRequest>,
) -> TeamResult<Json<SharedSession>> {
    state.collab.share_session(&team_id, request).await.map(Json)
}

async fn list_sessions(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<Vec<SharedSessionListItem>>> {
    state.collab.list_sessions(&team_id).await.map(Json)
}

async fn get_session(
    State(state): State<AppState>,
    Path((team_id, share_id)): Path<(String, String)>,
) -> TeamResult<Json<SessionDetail>> {
    state.collab.get_session(&team_id, &share_id).await.map(Json)
}

async fn add_comment(
    State(state): State<AppState>,
    Path((team_id, share_id)): Path<(String, String)>,
    Json(request): Json<AddCommentRequest>,
) -> TeamResult<Json<SessionComment>> {
    state
        .collab
        .add_comment(&team_id, &share_id, request)
        .await
        .map(Json)
}

async fn get_project_config(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<TeamProjectConfig>> {
    state.collab.get_project_config(&team_id).await.map(Json)
}

async fn set_project_config(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<SetProjectConfigRequest>,
) -> TeamResult<Json<TeamProjectConfig>> {
    state.collab.set_project_config(&team_id, request).await.map(Json)
}

async fn add_project(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<AddProjectRequest>,
) -> TeamResult<Json<ProjectEntry>> {
    state.collab.add_project(&team_id, request).await.map(Json)
}

async fn remove_project(
    State(state): State<AppState>,
    Path((team_id, project_id)): Path<(String, String)>,
) -> TeamResult<Json<Ack>> {
    state.collab.remove_project(&team_id, &project_id).await?;
    Ok(Json(Ack::OK))
}

// ═══════════════════════════════════════════════════════════════════════════
// Weekly Report
// ═══════════════════════════════════════════════════════════════════════════

/// `?week_start=YYYY-MM-DD`, any day of the wanted week
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeekQuery {
    pub week_start: Option<String>,
}

async fn weekly_report(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(query): Query<WeekQuery>,
) -> TeamResult<Json<TeamWeeklyView>> {
    state
        .reports
        .get_weekly_report(&team_id, query.week_start.as_deref())
        .await
        .map(Json)
}

async fn refresh_weekly_report(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(query): Query<WeekQuery>,
) -> TeamResult<Json<RefreshOutcome>> {
    state
        .reports
        .refresh_weekly_stats(&team_id, query.week_start.as_deref())
        .await
        .map(Json)
}

async fn member_daily_detail(
    State(state): State<AppState>,
    Path((team_id, member_id)): Path<(String, String)>,
    Query(query): Query<DateQuery>,
) -> TeamResult<Json<MemberDailyDetail>> {
    let date = query
        .date
        .ok_or_else(|| TeamError::validation("date is required"))?;
    state
        .reports
        .get_member_daily_detail(&team_id, &member_id, &date)
        .await
        .map(Json)
}

// ═══════════════════════════════════════════════════════════════════════════
// Skills
// ═══════════════════════════════════════════════════════════════════════════

async fn validate_skill(
    State(state): State<AppState>,
    Json(request): Json<SkillPathRequest>,
) -> TeamResult<Json<ValidationResult>> {
    state.skills.validate(&request.path).map(Json)
}

async fn installed_skills(State(state): State<AppState>) -> Json<Vec<InstalledSkillEntry>> {
    Json(state.skills.installed().entries())
}

async fn list_skills(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<TeamSkillIndex>> {
    state.skills.list_skills(&team_id).await.map(Json)
}

async fn publish_skill(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<PublishSkillRequest>,
) -> TeamResult<Json<SkillPackageMeta>> {
    if request.path.as_os_str().is_empty() {
        return Err(TeamError::Validation("skill path is required".into()));
    }
    state
        .skills
        .publish(&team_id, &request.path, request.metadata)
        .await
        .map(Json)
}

async fn unpublish_skill(
    State(state): State<AppState>,
    Path((team_id, plugin_id)): Path<(String, String)>,
) -> TeamResult<Json<Ack>> {
    state.skills.unpublish(&team_id, &plugin_id).await?;
    Ok(Json(Ack::OK))
}

async fn download_skill(
    State(state): State<AppState>,
    Path((team_id, plugin_id)): Path<(String, String)>,
) -> TeamResult<Json<DownloadStatus>> {
    state
        .skills
        .download_from_index(&team_id, &plugin_id)
        .await
        .map(Json)
}

async fn install_skill(
    State(state): State<AppState>,
    Path((team_id, plugin_id)): Path<(String, String)>,
    Query(query): Query<InstallQuery>,
) -> TeamResult<Json<InstalledSkill>> {
    state
        .skills
        .install(&team_id, &plugin_id, query.force)
        .await
        .map(Json)
}

async fn uninstall_skill(
    State(state): State<AppState>,
    Path((team_id, plugin_id)): Path<(String, String)>,
) -> TeamResult<Json<Ack>> {
    state.skills.uninstall(&team_id, &plugin_id)?;
    Ok(Json(Ack::OK))
}

async fn downloads(State(state): State<AppState>) -> Json<Vec<DownloadStatus>> {
    Json(state.skills.download_statuses())
}
