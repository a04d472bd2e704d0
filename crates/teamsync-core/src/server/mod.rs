//! HTTP surface of a node.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Router                                                          │
//! │  ├── /p2p/health, /p2p/skills/{id}/...   peer routes            │
//! │  ├── /p2p/weekly-stats, /p2p/daily-detail  activity for leader  │
//! │  ├── /team/...                           leader protocol + ws   │
//! │  └── /api/v1/...                         local API (CLI, UI)    │
//! │  layers: CorsLayer, TraceLayer                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod error;
pub mod peer;

use std::sync::Arc;

use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::collab::CollaborationService;
use crate::config::Config;
use crate::identity::IdentityStore;
use crate::network::NetworkManager;
use crate::presence::PresenceContext;
use crate::report::WeeklyReportService;
use crate::skill::SkillSyncService;
use crate::team::TeamService;

pub use error::ErrorBody;

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identity: IdentityStore,
    pub network: NetworkManager,
    pub teams: Arc<TeamService>,
    pub collab: CollaborationService,
    pub skills: Arc<SkillSyncService>,
    pub presence: PresenceContext,
    pub reports: Arc<WeeklyReportService>,
}

/// `{"success": true}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub const OK: Ack = Ack { success: true };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `?date=YYYY-MM-DD`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(peer::routes())
        .nest("/api/v1", api::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::node::TeamNode;

    async fn test_node() -> (TempDir, TeamNode) {
        let temp = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(temp.path());
        config.skills_dir = temp.path().join("skills");
        let node = TeamNode::new(config).await.unwrap();
        (temp, node)
    }

    async fn call(node: &TeamNode, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = node
            .router()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_on_both_surfaces() {
        let (_temp, node) = test_node().await;

        let (status, body) = call(&node, "GET", "/p2p/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = call(&node, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_identity_roundtrip_over_api() {
        let (_temp, node) = test_node().await;

        let (status, body) = call(&node, "GET", "/api/v1/identity", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, created) =
            call(&node, "POST", "/api/v1/identity", Some(json!({"name": "Ada"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["name"], "Ada");

        let (_, renamed) =
            call(&node, "POST", "/api/v1/identity", Some(json!({"name": "Grace"}))).await;
        assert_eq!(renamed["id"], created["id"]);
        assert_eq!(renamed["name"], "Grace");
    }

    #[tokio::test]
    async fn test_unknown_team_is_not_found() {
        let (_temp, node) = test_node().await;

        let (status, body) = call(&node, "GET", "/api/v1/teams/nope/members", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
        assert!(body["error"].as_str().unwrap().contains("nope"));

        let (status, _) = call(&node, "GET", "/team/nope/sessions", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_activity_routes_validate_dates() {
        let (temp, node) = test_node().await;
        node.identity().ensure("Ada").unwrap();

        let (status, body) = call(&node, "GET", "/p2p/weekly-stats", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("week_start"));

        let (status, _) = call(&node, "GET", "/p2p/daily-detail?date=2026-02-30", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        std::fs::create_dir_all(temp.path().join("activity")).unwrap();
        std::fs::write(
            temp.path().join("activity/2026-10-20.json"),
            r#"{"session_stats": {"session_count": 2, "tokens_used": 900}}"#,
        )
        .unwrap();
        let (status, week) = call(&node, "GET", "/p2p/weekly-stats?week_start=2026-10-22", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(week["week_start"], "2026-10-19");
        assert_eq!(week["daily_stats"][1]["session_stats"]["session_count"], 2);

        let (status, detail) =
            call(&node, "GET", "/p2p/daily-detail?date=2026-10-20&repo_urls=", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["member_name"], "Ada");
        assert_eq!(detail["is_online"], true);

        let (status, _) = call(&node, "GET", "/api/v1/teams/nope/weekly-report", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_teams_list_starts_empty() {
        let (_temp, node) = test_node().await;

        let (status, body) = call(&node, "GET", "/api/v1/teams", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
