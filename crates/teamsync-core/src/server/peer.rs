//! Routes other nodes call: the membership protocol, forwarded
//! collaboration, the presence socket, skill transfer and activity stats.
//!
//! Forwarded collaboration is served by the leader strategy only; any other
//! node answers 403.

use bytes::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use crate::collab::{
    CodeSnippet, SessionComment, SessionDetail, SetProjectConfigRequest, SharedSession,
    SharedSessionListItem, TeamDailySummary, TeamProjectConfig,
};
use serde::Deserialize;

use crate::error::{TeamError, TeamResult};
use crate::presence::socket::serve_socket;
use crate::report::{MemberDailyDetail, MemberWeeklyStats};
use crate::server::{Ack, AppState, DateQuery, HealthResponse};
use crate::skill::{SkillPackageMeta, TeamSkillIndex};
use crate::team::{JoinRequest, JoinResponse, LeaveRequest, MemberWorkStatus, TeamInfo, TeamMember};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/p2p/health", get(health))
        .route("/p2p/skills/{plugin_id}/meta", get(skill_meta))
        .route("/p2p/skills/{plugin_id}/download", get(skill_download))
        .route("/p2p/weekly-stats", get(weekly_stats))
        .route("/p2p/daily-detail", get(daily_detail))
        .route("/team/info", get(current_team_info))
        .route("/team/{team_id}/info", get(team_info))
        .route("/team/{team_id}/join", post(join))
        .route("/team/{team_id}/leave", post(leave))
        .route("/team/{team_id}/members", get(members))
        .route("/team/{team_id}/skills", get(skill_index).post(put_skill))
        .route("/team/{team_id}/skills/{plugin_id}", delete(delete_skill))
        .route("/team/{team_id}/ws", get(presence_socket))
        .route("/team/{team_id}/status", post(update_status))
        .route("/team/{team_id}/share-code", post(share_code))
        .route("/team/{team_id}/daily-summaries/share", post(share_daily_summary))
        .route("/team/{team_id}/daily-summaries", get(list_daily_summaries))
        .route("/team/{team_id}/sessions/share", post(share_session))
        .route("/team/{team_id}/sessions", get(list_sessions))
        .route("/team/{team_id}/sessions/{share_id}", get(get_session))
        .route("/team/{team_id}/sessions/{share_id}/comments", post(add_comment))
        .route(
            "/team/{team_id}/project-config",
            get(get_project_config).post(set_project_config),
        )
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

// ═══════════════════════════════════════════════════════════════════════════
// Membership
// ═══════════════════════════════════════════════════════════════════════════

async fn current_team_info(State(state): State<AppState>) -> TeamResult<Json<TeamInfo>> {
    state.teams.team_info(None).map(Json)
}

async fn team_info(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<TeamInfo>> {
    state.teams.team_info(Some(&team_id)).map(Json)
}

async fn join(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> TeamResult<Json<JoinResponse>> {
    state.teams.handle_join_request(&team_id, request).await.map(Json)
}

async fn leave(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<LeaveRequest>,
) -> TeamResult<Json<Ack>> {
    state.teams.handle_leave_request(&team_id, request).await?;
    Ok(Json(Ack::OK))
}

async fn members(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<Vec<TeamMember>>> {
    Ok(Json(state.teams.team_info(Some(&team_id))?.members))
}

async fn presence_socket(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let ctx = state.presence.clone();
    ws.on_upgrade(move |socket| serve_socket(socket, team_id, ctx))
}

// ═══════════════════════════════════════════════════════════════════════════
// Skills
// ═══════════════════════════════════════════════════════════════════════════

async fn skill_index(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<TeamSkillIndex>> {
    state.skills.canonical_index(&team_id).map(Json)
}

async fn put_skill(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(entry): Json<SkillPackageMeta>,
) -> TeamResult<Json<SkillPackageMeta>> {
    state.skills.apply_index_entry(&team_id, entry).await.map(Json)
}

async fn delete_skill(
    State(state): State<AppState>,
    Path((team_id, plugin_id)): Path<(String, String)>,
) -> TeamResult<Json<Ack>> {
    state.skills.remove_index_entry(&team_id, &plugin_id).await?;
    Ok(Json(Ack::OK))
}

async fn skill_meta(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
) -> TeamResult<Json<SkillPackageMeta>> {
    state.skills.skill_meta(&plugin_id).map(Json)
}

async fn skill_download(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
) -> TeamResult<Response> {
    let archive = state.skills.skill_archive(&plugin_id).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Bytes::from(archive),
    )
        .into_response())
}

// ═══════════════════════════════════════════════════════════════════════════
// Forwarded Collaboration
// ═══════════════════════════════════════════════════════════════════════════

async fn update_status(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(status): Json<MemberWorkStatus>,
) -> TeamResult<Json<Ack>> {
    state.collab.leader(&team_id)?.update_work_status(status).await?;
    Ok(Json(Ack::OK))
}

async fn share_code(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(snippet): Json<CodeSnippet>,
) -> TeamResult<Json<CodeSnippet>> {
    state.collab.leader(&team_id)?.share_code(snippet).await.map(Json)
}

async fn share_daily_summary(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(summary): Json<TeamDailySummary>,
) -> TeamResult<Json<TeamDailySummary>> {
    state
        .collab
        .leader(&team_id)?
        .share_daily_summary(summary)
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
        .leader(&team_id)?
        .list_daily_summaries(query.date.as_deref())
        .await
        .map(Json)
}

async fn share_session(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(session): Json<SharedSession>,
) -> TeamResult<Json<SharedSession>> {
    state.collab.leader(&team_id)?.share_session(session).await.map(Json)
}

async fn list_sessions(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<Vec<SharedSessionListItem>>> {
    state.collab.leader(&team_id)?.list_sessions().await.map(Json)
}

async fn get_session(
    State(state): State<AppState>,
    Path((team_id, share_id)): Path<(String, String)>,
) -> TeamResult<Json<SessionDetail>> {
    state.collab.leader(&team_id)?.get_session(&share_id).await.map(Json)
}

async fn add_comment(
    State(state): State<AppState>,
    Path((team_id, share_id)): Path<(String, String)>,
    Json(mut comment): Json<SessionComment>,
) -> TeamResult<Json<SessionComment>> {
    comment.share_id = share_id;
    state.collab.leader(&team_id)?.add_comment(comment).await.map(Json)
}

async fn get_project_config(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> TeamResult<Json<TeamProjectConfig>> {
    state.collab.leader(&team_id)?.get_project_config().await.map(Json)
}

async fn set_project_config(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(request): Json<SetProjectConfigRequest>,
) -> TeamResult<Json<TeamProjectConfig>> {
    let leader = state.collab.leader(&team_id)?;
    request.validate()?;
    leader.set_project_config(request.projects).await.map(Json)
}

// ═══════════════════════════════════════════════════════════════════════════
// Activity Stats
// ═══════════════════════════════════════════════════════════════════════════

/// `?week_start=|date=YYYY-MM-DD&repo_urls=a,b`
#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    week_start: Option<String>,
    date: Option<String>,
    repo_urls: Option<String>,
}

impl StatsQuery {
    fn repo_urls(&self) -> Vec<String> {
        self.repo_urls
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(String::from)
            .collect()
    }
}

fn required<'a>(name: &str, value: &'a Option<String>) -> TeamResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TeamError::validation(format!("{} is required", name)))
}

async fn weekly_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> TeamResult<Json<MemberWeeklyStats>> {
    let week_start = required("week_start", &query.week_start)?;
    state
        .reports
        .local_weekly_stats(week_start, &query.repo_urls())
        .map(Json)
}

async fn daily_detail(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> TeamResult<Json<MemberDailyDetail>> {
    let date = required("date", &query.date)?;
    state
        .reports
        .local_daily_detail(date, &query.repo_urls())
        .map(Json)
}
