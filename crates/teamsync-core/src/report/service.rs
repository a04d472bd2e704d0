//! Weekly report: the leader asks every member for its week and lays the
//! answers out as one team calendar.
//!
//! ```text
//! leader                                        member
//! ──────                                        ──────
//! get_weekly_report(week)
//!   for each member:
//!     fresh cache entry? ── use it
//!     self?              ── WeeklyStatsProvider
//!     online?            ── GET /p2p/weekly-stats ──► WeeklyStatsProvider
//!     failed / offline   ── stale cache entry, if any
//!   cache what was fetched
//!   TeamWeeklyView::build
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collab::CollaborationService;
use crate::error::{TeamError, TeamResult};
use crate::identity::IdentityStore;
use crate::report::cache::{WeeklyStatsCache, CACHE_TTL};
use crate::report::model::{
    format_date, parse_date, week_start_of, MemberDailyDetail, MemberWeeklyStats, TeamWeeklyView,
};
use crate::report::provider::WeeklyStatsProvider;
use crate::storage::Storage;
use crate::team::client::MembershipClient;
use crate::team::model::{Team, TeamMember};
use crate::team::registry::TeamRegistry;

/// Everything `WeeklyReportService` needs from the rest of the node
#[derive(Clone)]
pub struct WeeklyReportDeps {
    pub storage: Storage,
    pub identity: IdentityStore,
    pub registry: TeamRegistry,
    pub collab: CollaborationService,
    pub client: MembershipClient,
    pub provider: Arc<dyn WeeklyStatsProvider>,
}

/// Which members a refresh reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub week_start: String,
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
}

pub struct WeeklyReportService {
    storage: Storage,
    identity: IdentityStore,
    registry: TeamRegistry,
    collab: CollaborationService,
    client: MembershipClient,
    provider: Arc<dyn WeeklyStatsProvider>,
    /// Loaded on first use, per team
    caches: Mutex<HashMap<String, WeeklyStatsCache>>,
}

impl WeeklyReportService {
    pub fn new(deps: WeeklyReportDeps) -> Self {
        Self {
            storage: deps.storage,
            identity: deps.identity,
            registry: deps.registry,
            collab: deps.collab,
            client: deps.client,
            provider: deps.provider,
            caches: Mutex::new(HashMap::new()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Member Side
    // ═══════════════════════════════════════════════════════════════════════

    /// This node's own week, as served to the leader. Any day of the week
    /// selects it.
    pub fn local_weekly_stats(&self, week_start: &str, repo_urls: &[String]) -> TeamResult<MemberWeeklyStats> {
        let monday = week_start_of(parse_date(week_start)?);
        self.provider.weekly_stats(monday, repo_urls)
    }

    pub fn local_daily_detail(&self, date: &str, repo_urls: &[String]) -> TeamResult<MemberDailyDetail> {
        let daily = self.provider.daily_stats(parse_date(date)?, repo_urls)?;
        let (member_id, member_name) = match self.identity.get() {
            Ok(me) => (me.id, me.name),
            Err(_) => (String::new(), String::new()),
        };
        Ok(MemberDailyDetail {
            member_id,
            member_name,
            date: daily.date,
            git_stats: daily.git_stats,
            session_stats: daily.session_stats,
            work_items: daily.work_items,
            has_report: daily.has_report,
            is_online: true,
            is_cached: false,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Leader Side
    // ═══════════════════════════════════════════════════════════════════════

    /// Team calendar for the week containing `week_start` (this week when
    /// absent).
    pub async fn get_weekly_report(&self, team_id: &str, week_start: Option<&str>) -> TeamResult<TeamWeeklyView> {
        let team = self.leader_team(team_id)?;
        let monday = monday_of(week_start)?;
        let week = format_date(monday);
        let members = self.registry.members();
        let repo_urls = self.repo_urls(team_id).await;
        let local_id = self.local_id();

        let cached = self.cached_week(team_id, &week)?;
        let mut stats = HashMap::new();
        let mut to_fetch = Vec::new();
        for member in &members {
            match cached.get(&member.id) {
                Some(entry) if !entry.is_expired() => {
                    stats.insert(member.id.clone(), entry.stats.clone());
                }
                _ if member.is_online || member.id == local_id => to_fetch.push(member),
                Some(stale) => {
                    stats.insert(member.id.clone(), stale.stats.clone());
                }
                None => {}
            }
        }

        let results = join_all(
            to_fetch
                .iter()
                .map(|m| self.fetch_member(m, &local_id, &week, &repo_urls)),
        )
        .await;

        let mut fetched = Vec::new();
        for (member, result) in to_fetch.into_iter().zip(results) {
            match result {
                Ok(week_stats) => {
                    stats.insert(member.id.clone(), week_stats.clone());
                    fetched.push(week_stats);
                }
                Err(e) => {
                    warn!(member_id = %member.id, endpoint = %member.endpoint, error = %e, "Failed to fetch member stats");
                    if let Some(stale) = cached.get(&member.id) {
                        stats.insert(member.id.clone(), stale.stats.clone());
                    }
                }
            }
        }
        debug!(%team_id, %week, fetched = fetched.len(), total = stats.len(), "Weekly stats collected");
        self.store_fetched(team_id, fetched);

        Ok(TeamWeeklyView::build(&team.id, monday, &members, &stats))
    }

    /// Re-fetch every reachable member, ignoring fresh cache entries.
    pub async fn refresh_weekly_stats(&self, team_id: &str, week_start: Option<&str>) -> TeamResult<RefreshOutcome> {
        self.leader_team(team_id)?;
        let week = format_date(monday_of(week_start)?);
        let repo_urls = self.repo_urls(team_id).await;
        let local_id = self.local_id();

        let members: Vec<TeamMember> = self
            .registry
            .members()
            .into_iter()
            .filter(|m| m.is_online || m.id == local_id)
            .collect();
        let results = join_all(
            members
                .iter()
                .map(|m| self.fetch_member(m, &local_id, &week, &repo_urls)),
        )
        .await;

        let mut outcome = RefreshOutcome {
            week_start: week.clone(),
            ..Default::default()
        };
        let mut fetched = Vec::new();
        for (member, result) in members.iter().zip(results) {
            match result {
                Ok(week_stats) => {
                    outcome.refreshed.push(member.id.clone());
                    fetched.push(week_stats);
                }
                Err(e) => {
                    warn!(member_id = %member.id, error = %e, "Failed to refresh member stats");
                    outcome.failed.push(member.id.clone());
                }
            }
        }
        self.store_fetched(team_id, fetched);
        info!(%team_id, %week, refreshed = outcome.refreshed.len(), failed = outcome.failed.len(), "Weekly stats refreshed");
        Ok(outcome)
    }

    /// One member's day. Falls back to the cached week when the member
    /// cannot answer.
    pub async fn get_member_daily_detail(
        &self,
        team_id: &str,
        member_id: &str,
        date: &str,
    ) -> TeamResult<MemberDailyDetail> {
        self.leader_team(team_id)?;
        let day = parse_date(date)?;
        let date = format_date(day);
        let member = self
            .registry
            .member(member_id)
            .ok_or_else(|| TeamError::NotTeamMember(member_id.to_string()))?;
        let repo_urls = self.repo_urls(team_id).await;

        if member.id == self.local_id() {
            return self.local_daily_detail(&date, &repo_urls);
        }
        if member.is_online {
            match self.client.daily_detail(&member.endpoint, &date, &repo_urls).await {
                Ok(mut detail) => {
                    detail.member_id = member.id.clone();
                    detail.member_name = member.name.clone();
                    detail.is_online = true;
                    detail.is_cached = false;
                    return Ok(detail);
                }
                Err(e) => warn!(%member_id, error = %e, "Failed to fetch member daily detail"),
            }
        }

        let week = format_date(week_start_of(day));
        let daily = self
            .cached_week(team_id, &week)?
            .remove(member_id)
            .and_then(|entry| entry.stats.day(&date).cloned())
            .ok_or_else(|| TeamError::StatsNotFound(format!("{} on {}", member.name, date)))?;
        let mut detail = MemberDailyDetail::from_daily(&member, daily);
        detail.is_cached = true;
        Ok(detail)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn leader_team(&self, team_id: &str) -> TeamResult<Team> {
        let team = self.registry.get(team_id)?;
        if !team.is_leader {
            return Err(TeamError::NotTeamLeader(team_id.to_string()));
        }
        Ok(team)
    }

    fn local_id(&self) -> String {
        self.identity.get().map(|me| me.id).unwrap_or_default()
    }

    async fn repo_urls(&self, team_id: &str) -> Vec<String> {
        match self.collab.get_project_config(team_id).await {
            Ok(config) => config.repo_urls(),
            Err(e) => {
                warn!(%team_id, error = %e, "Project config unavailable, reporting on all repos");
                Vec::new()
            }
        }
    }

    async fn fetch_member(
        &self,
        member: &TeamMember,
        local_id: &str,
        week: &str,
        repo_urls: &[String],
    ) -> TeamResult<MemberWeeklyStats> {
        let mut stats = if member.id == local_id {
            self.local_weekly_stats(week, repo_urls)?
        } else {
            self.client.weekly_stats(&member.endpoint, week, repo_urls).await?
        };
        stats.member_id = member.id.clone();
        stats.member_name = member.name.clone();
        stats.week_start = week.to_string();
        Ok(stats)
    }

    /// Cache entries for `week`, keyed by member id.
    fn cached_week(
        &self,
        team_id: &str,
        week: &str,
    ) -> TeamResult<HashMap<String, crate::report::cache::CacheEntry>> {
        let mut caches = self.caches.lock();
        let cache = match caches.entry(team_id.to_string()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(WeeklyStatsCache::load(&self.storage, team_id)?),
        };
        Ok(cache
            .entries
            .iter()
            .filter(|e| e.week_start == week)
            .map(|e| (e.member_id.clone(), e.clone()))
            .collect())
    }

    /// Cache `fetched`. The new cache only replaces the old one once it is
    /// on disk; a failed write is logged and otherwise ignored.
    fn store_fetched(&self, team_id: &str, fetched: Vec<MemberWeeklyStats>) {
        if fetched.is_empty() {
            return;
        }
        let mut caches = self.caches.lock();
        let mut next = match caches.get(team_id) {
            Some(cache) => cache.clone(),
            None => match WeeklyStatsCache::load(&self.storage, team_id) {
                Ok(cache) => cache,
                Err(e) => {
                    warn!(%team_id, error = %e, "Failed to load weekly stats cache");
                    return;
                }
            },
        };
        for stats in fetched {
            next.set(stats, CACHE_TTL);
        }
        next.clean_expired();
        match next.save(&self.storage) {
            Ok(()) => {
                caches.insert(team_id.to_string(), next);
            }
            Err(e) => warn!(%team_id, error = %e, "Failed to save weekly stats cache"),
        }
    }
}

fn monday_of(week_start: Option<&str>) -> TeamResult<NaiveDate> {
    let day = match week_start {
        Some(date) => parse_date(date)?,
        None => chrono::Local::now().date_naive(),
    };
    Ok(week_start_of(day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::Query;
    use axum::response::Json;
    use axum::routing::get;
    use axum::Router;
    use tempfile::TempDir;

    use crate::collab::{FileDailySummaryStore, LeaderCollab, ProjectEntry, SetProjectConfigRequest};
    use crate::config::Config;
    use crate::presence::hub::PresenceHub;
    use crate::report::model::git_day;
    use crate::report::provider::FileWeeklyStatsProvider;
    use crate::team::registry::sample_team;
    use crate::types::now;

    // ========================================================================
    // Test Utilities
    // ========================================================================

    /// A member answering the stats routes with fixed data.
    struct StubMember {
        endpoint: String,
        hits: Arc<AtomicUsize>,
        last_repos: Arc<Mutex<Option<String>>>,
    }

    async fn stub_member() -> StubMember {
        let hits = Arc::new(AtomicUsize::new(0));
        let last_repos = Arc::new(Mutex::new(None));
        let week = MemberWeeklyStats {
            member_id: "spoofed".into(),
            member_name: "Spoofed".into(),
            week_start: "2026-10-19".into(),
            daily_stats: vec![git_day("2026-10-20", &[("github.com/acme/api", 7, 70, 7)])],
            updated_at: now(),
        };

        let app = Router::new()
            .route(
                "/p2p/weekly-stats",
                get({
                    let hits = hits.clone();
                    let last_repos = last_repos.clone();
                    move |Query(q): Query<HashMap<String, String>>| {
                        let hits = hits.clone();
                        let last_repos = last_repos.clone();
                        let week = week.clone();
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            *last_repos.lock() = q.get("repo_urls").cloned();
                            Json(week)
                        }
                    }
                }),
            )
            .route(
                "/p2p/daily-detail",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let date = q.get("date").cloned().unwrap_or_default();
                    let mut daily = git_day(&date, &[("github.com/acme/api", 2, 20, 2)]);
                    daily.has_report = true;
                    let mut detail = MemberDailyDetail::from_daily(
                        &TeamMember::new("spoofed", "Spoofed", "x", false),
                        daily,
                    );
                    detail.is_online = false;
                    Json(detail)
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        StubMember {
            endpoint,
            hits,
            last_repos,
        }
    }

    async fn dead_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    struct Fixture {
        temp: TempDir,
        service: WeeklyReportService,
        storage: Storage,
        stub: StubMember,
    }

    /// Leader (local) + m1 (stub, online) + m2 (unreachable, online)
    /// + m3 (offline).
    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
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

        let stub = stub_member().await;
        registry
            .upsert_member(TeamMember::new("m1", "Ada", &stub.endpoint, false))
            .unwrap();
        registry
            .upsert_member(TeamMember::new("m2", "Bo", &dead_endpoint().await, false))
            .unwrap();
        let mut cy = TeamMember::new("m3", "Cy", "127.0.0.1:9", false);
        cy.is_online = false;
        registry.upsert_member(cy).unwrap();

        let summaries = Arc::new(FileDailySummaryStore::new(temp.path().join("daily-summaries")));
        let collab = CollaborationService::new(identity.clone(), summaries.clone());
        collab.select(Arc::new(
            LeaderCollab::load("t1", storage.clone(), registry.clone(), PresenceHub::spawn()).unwrap(),
        ));
        collab
            .set_project_config(
                "t1",
                SetProjectConfigRequest {
                    projects: vec![ProjectEntry {
                        id: String::new(),
                        name: "api".into(),
                        repo_url: "github.com/acme/api".into(),
                    }],
                },
            )
            .await
            .unwrap();

        let activity = temp.path().join("activity");
        std::fs::create_dir_all(&activity).unwrap();
        std::fs::write(
            activity.join("2026-10-21.json"),
            r#"{"git_stats": {"total_commits": 1, "total_added": 3, "total_removed": 1, "projects": [
                {"project_name": "api", "repo_url": "git@github.com:acme/api.git", "commits": 1, "lines_added": 3, "lines_removed": 1}
            ]}}"#,
        )
        .unwrap();

        let mut config = Config::with_data_dir(temp.path());
        config.forward_timeout = std::time::Duration::from_millis(500);
        let service = WeeklyReportService::new(WeeklyReportDeps {
            storage: storage.clone(),
            identity,
            registry,
            collab,
            client: MembershipClient::new(&config),
            provider: Arc::new(FileWeeklyStatsProvider::new(activity, summaries)),
        });
        Fixture {
            temp,
            service,
            storage,
            stub,
        }
    }

    /// Put a stale week for m2 in the cache.
    fn seed_stale(f: &Fixture) {
        let mut cache = WeeklyStatsCache::load(&f.storage, "t1").unwrap();
        cache.set(
            MemberWeeklyStats {
                member_id: "m2".into(),
                member_name: "Bo".into(),
                week_start: "2026-10-19".into(),
                daily_stats: vec![git_day("2026-10-23", &[("github.com/acme/api", 2, 10, 0)])],
                updated_at: now(),
            },
            chrono::Duration::seconds(-1),
        );
        cache.save(&f.storage).unwrap();
    }

    fn cell<'a>(view: &'a TeamWeeklyView, date: &str, member_id: &str) -> &'a crate::report::model::MemberDayCell {
        view.calendar
            .iter()
            .find(|c| c.date == date)
            .and_then(|c| c.members.iter().find(|m| m.member_id == member_id))
            .unwrap()
    }

    // ========================================================================
    // Weekly Report
    // ========================================================================

    #[tokio::test]
    async fn test_report_fans_out_and_falls_back() {
        let f = fixture().await;
        seed_stale(&f);
        let leader_id = f.service.local_id();

        // Mid-week date selects the whole week
        let view = f
            .service
            .get_weekly_report("t1", Some("2026-10-22"))
            .await
            .unwrap();
        assert_eq!(view.week_start, "2026-10-19");
        assert_eq!(view.calendar[0].members.len(), 4);

        // Local stats straight from the provider
        assert_eq!(cell(&view, "2026-10-21", &leader_id).commits, 1);
        // Member stats over HTTP, with the configured repos forwarded
        assert_eq!(cell(&view, "2026-10-20", "m1").commits, 7);
        assert_eq!(f.stub.hits.load(Ordering::SeqCst), 1);
        assert_eq!(f.stub.last_repos.lock().as_deref(), Some("github.com/acme/api"));
        // Unreachable member: stale cache
        assert_eq!(cell(&view, "2026-10-23", "m2").commits, 2);
        // Offline without cache: empty row
        assert!(view.calendar.iter().all(|c| c
            .members
            .iter()
            .any(|m| m.member_id == "m3" && m.commits == 0 && !m.is_online)));

        let api = &view.project_summary[0];
        assert_eq!(api.total_commits, 10);
        assert_eq!(api.contributors[0].member_name, "Ada");

        // Fetched weeks are cached under the registry identity, not the
        // one the member reported
        let cache = WeeklyStatsCache::load(&f.storage, "t1").unwrap();
        assert_eq!(cache.get("m1", "2026-10-19").unwrap().stats.member_name, "Ada");
        assert!(cache.get("spoofed", "2026-10-19").is_none());
        assert!(cache.get(&leader_id, "2026-10-19").is_some());
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch_and_refresh_forces_it() {
        let f = fixture().await;
        f.service.get_weekly_report("t1", Some("2026-10-19")).await.unwrap();
        f.service.get_weekly_report("t1", Some("2026-10-19")).await.unwrap();
        assert_eq!(f.stub.hits.load(Ordering::SeqCst), 1);

        let outcome = f
            .service
            .refresh_weekly_stats("t1", Some("2026-10-25"))
            .await
            .unwrap();
        assert_eq!(outcome.week_start, "2026-10-19");
        assert_eq!(f.stub.hits.load(Ordering::SeqCst), 2);
        assert!(outcome.refreshed.contains(&"m1".to_string()));
        assert!(outcome.refreshed.contains(&f.service.local_id()));
        assert_eq!(outcome.failed, vec!["m2".to_string()]);
    }

    #[tokio::test]
    async fn test_report_is_leader_only() {
        let f = fixture().await;
        assert!(matches!(
            f.service.get_weekly_report("other", None).await,
            Err(TeamError::TeamNotFound(_))
        ));
        assert!(matches!(
            f.service.get_weekly_report("t1", Some("next week")).await,
            Err(TeamError::Validation(_))
        ));

        let member_registry = TeamRegistry::load(Storage::new(f.temp.path().join("member")).unwrap()).unwrap();
        member_registry
            .install_member_team(
                sample_team("t2", false),
                vec![TeamMember::new("leader", "L", "127.0.0.1:1", true)],
            )
            .unwrap();
        let member_service = WeeklyReportService::new(WeeklyReportDeps {
            storage: f.storage.clone(),
            identity: f.service.identity.clone(),
            registry: member_registry,
            collab: f.service.collab.clone(),
            client: f.service.client.clone(),
            provider: f.service.provider.clone(),
        });
        assert!(matches!(
            member_service.get_weekly_report("t2", None).await,
            Err(TeamError::NotTeamLeader(_))
        ));
    }

    // ========================================================================
    // Daily Detail
    // ========================================================================

    #[tokio::test]
    async fn test_daily_detail_sources() {
        let f = fixture().await;
        seed_stale(&f);

        let live = f
            .service
            .get_member_daily_detail("t1", "m1", "2026-10-20")
            .await
            .unwrap();
        assert_eq!(live.member_name, "Ada");
        assert!(live.is_online);
        assert!(!live.is_cached);
        assert!(live.has_report);

        let cached = f
            .service
            .get_member_daily_detail("t1", "m2", "2026-10-23")
            .await
            .unwrap();
        assert!(cached.is_cached);
        assert_eq!(cached.git_stats.unwrap().total_commits, 2);

        let local = f
            .service
            .get_member_daily_detail("t1", &f.service.local_id(), "2026-10-21")
            .await
            .unwrap();
        assert_eq!(local.member_name, "Leader");
        assert_eq!(local.git_stats.unwrap().total_commits, 1);

        assert!(matches!(
            f.service.get_member_daily_detail("t1", "m3", "2026-10-20").await,
            Err(TeamError::StatsNotFound(_))
        ));
        assert!(matches!(
            f.service.get_member_daily_detail("t1", "nobody", "2026-10-20").await,
            Err(TeamError::NotTeamMember(_))
        ));
    }
}
