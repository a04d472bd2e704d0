//! Team collaboration: work status, code snippets, shared sessions,
//! comments, daily summaries and the team project config.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  CollaborationService (local API facade)                         │
//! │  ├── stamps the local identity on every record                   │
//! │  ├── validates before anything leaves the node                   │
//! │  └── strategy: Arc<dyn Collaboration>, picked once per role      │
//! │      ├── LeaderCollab: apply to canonical stores, then broadcast │
//! │      └── MemberCollab: forward to http://{leader}/team/{id}/...  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod leader;
pub mod member;
pub mod model;
pub mod service;
pub mod store;

pub use leader::LeaderCollab;
pub use member::MemberCollab;
pub use model::*;
pub use service::CollaborationService;
pub use store::{DailySummaryStore, FileDailySummaryStore};

use async_trait::async_trait;

use crate::error::TeamResult;
use crate::team::model::MemberWorkStatus;

/// Collaboration operations on one team.
///
/// Records arrive fully built (ids assigned, sender stamped). The leader
/// implementation is also what serves forwarded writes from members.
#[async_trait]
pub trait Collaboration: Send + Sync {
    fn team_id(&self) -> &str;

    fn is_leader(&self) -> bool;

    async fn update_work_status(&self, status: MemberWorkStatus) -> TeamResult<()>;

    async fn share_code(&self, snippet: CodeSnippet) -> TeamResult<CodeSnippet>;

    async fn share_daily_summary(&self, summary: TeamDailySummary) -> TeamResult<TeamDailySummary>;

    async fn share_session(&self, session: SharedSession) -> TeamResult<SharedSession>;

    async fn add_comment(&self, comment: SessionComment) -> TeamResult<SessionComment>;

    async fn list_sessions(&self) -> TeamResult<Vec<SharedSessionListItem>>;

    async fn get_session(&self, share_id: &str) -> TeamResult<SessionDetail>;

    async fn list_daily_summaries(&self, date: Option<&str>) -> TeamResult<Vec<TeamDailySummary>>;

    async fn get_project_config(&self) -> TeamResult<TeamProjectConfig>;

    async fn set_project_config(&self, projects: Vec<ProjectEntry>) -> TeamResult<TeamProjectConfig>;

    /// Add a project, or replace the one with the same id or repo URL.
    async fn add_project(&self, project: ProjectEntry) -> TeamResult<ProjectEntry>;

    async fn remove_project(&self, project_id: &str) -> TeamResult<()>;
}
