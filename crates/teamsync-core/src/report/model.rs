//! Weekly activity records and the leader's aggregated week view.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{TeamError, TeamResult};
use crate::team::model::TeamMember;
use crate::types::{now, Timestamp};

const DATE_FORMAT: &str = "%Y-%m-%d";

// ═══════════════════════════════════════════════════════════════════════════
// Dates
// ═══════════════════════════════════════════════════════════════════════════

pub fn parse_date(date: &str) -> TeamResult<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| TeamError::validation(format!("invalid date {:?}, expected YYYY-MM-DD", date)))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Monday of the week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// The seven days starting at `monday`.
pub fn week_days(monday: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    (0..7).map(move |i| monday + Duration::days(i))
}

/// Reduce a git remote to `host/owner/repo` so the ssh and https forms of
/// one repository compare equal.
pub fn normalize_repo_url(url: &str) -> String {
    let mut s = url.trim().to_ascii_lowercase();
    let mut had_scheme = false;
    for scheme in ["https://", "http://", "ssh://", "git://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest.to_string();
            had_scheme = true;
            break;
        }
    }
    if let Some((user, rest)) = s.split_once('@') {
        if !user.contains('/') {
            s = rest.to_string();
        }
    }
    // scp-like `host:owner/repo`; with a scheme the colon is a port
    if !had_scheme {
        if let Some((host, path)) = s.split_once(':') {
            if !host.contains('/') {
                s = format!("{}/{}", host, path.trim_start_matches('/'));
            }
        }
    }
    let s = s.trim_end_matches('/');
    s.strip_suffix(".git").unwrap_or(s).to_string()
}

// ═══════════════════════════════════════════════════════════════════════════
// Member Stats
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub hash: String,
    /// First line of the commit message
    pub message: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub files_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectGitStats {
    pub project_name: String,
    pub repo_url: String,
    pub commits: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
    #[serde(default)]
    pub commit_messages: Vec<CommitSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitDailyStats {
    pub total_commits: u32,
    pub total_added: u64,
    pub total_removed: u64,
    #[serde(default)]
    pub projects: Vec<ProjectGitStats>,
}

impl GitDailyStats {
    /// Keep only projects whose remote is in `repo_urls` and recompute the
    /// totals. An empty filter keeps everything.
    pub fn retain_repos(&mut self, repo_urls: &[String]) {
        if !repo_urls.is_empty() {
            let wanted: Vec<String> = repo_urls.iter().map(|u| normalize_repo_url(u)).collect();
            self.projects
                .retain(|p| wanted.contains(&normalize_repo_url(&p.repo_url)));
        }
        self.total_commits = self.projects.iter().map(|p| p.commits).sum();
        self.total_added = self.projects.iter().map(|p| p.lines_added).sum();
        self.total_removed = self.projects.iter().map(|p| p.lines_removed).sum();
    }
}

/// Assistant session activity for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDailyStats {
    pub session_count: u32,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub lines_added: u64,
    #[serde(default)]
    pub lines_removed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemSummary {
    pub project: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberDailyStats {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_stats: Option<GitDailyStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_stats: Option<SessionDailyStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub work_items: Vec<WorkItemSummary>,
    #[serde(default)]
    pub has_report: bool,
}

/// One member's week, as served by `GET /p2p/weekly-stats`.
///
/// `member_id` and `member_name` are filled in by the leader, not the member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberWeeklyStats {
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub member_name: String,
    pub week_start: String,
    pub daily_stats: Vec<MemberDailyStats>,
    pub updated_at: Timestamp,
}

impl MemberWeeklyStats {
    pub fn day(&self, date: &str) -> Option<&MemberDailyStats> {
        self.daily_stats.iter().find(|d| d.date == date)
    }
}

/// One member's day in full, as served by `GET /p2p/daily-detail`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDailyDetail {
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub member_name: String,
    pub date: String,
    #[serde(default)]
    pub git_stats: Option<GitDailyStats>,
    #[serde(default)]
    pub session_stats: Option<SessionDailyStats>,
    #[serde(default)]
    pub work_items: Vec<WorkItemSummary>,
    #[serde(default)]
    pub has_report: bool,
    #[serde(default)]
    pub is_online: bool,
    /// Built from the leader's cache because the member could not answer
    #[serde(default)]
    pub is_cached: bool,
}

impl MemberDailyDetail {
    pub fn from_daily(member: &TeamMember, daily: MemberDailyStats) -> Self {
        Self {
            member_id: member.id.clone(),
            member_name: member.name.clone(),
            date: daily.date,
            git_stats: daily.git_stats,
            session_stats: daily.session_stats,
            work_items: daily.work_items,
            has_report: daily.has_report,
            is_online: member.is_online,
            is_cached: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Week View
// ═══════════════════════════════════════════════════════════════════════════

/// 0 for no commits, then 1-2, 3-5, 6-10 and more than 10.
pub fn activity_level(commits: u32) -> u8 {
    match commits {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        6..=10 => 3,
        _ => 4,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDayCell {
    pub member_id: String,
    pub member_name: String,
    pub activity_level: u8,
    pub commits: u32,
    /// Added plus removed
    pub lines_changed: u64,
    pub has_report: bool,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDayColumn {
    pub date: String,
    /// 1 = Monday .. 7 = Sunday
    pub day_of_week: u8,
    pub members: Vec<MemberDayCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorStats {
    pub member_id: String,
    pub member_name: String,
    pub commits: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectWeekStats {
    pub project_name: String,
    pub repo_url: String,
    pub total_commits: u32,
    pub total_added: u64,
    pub total_removed: u64,
    pub contributors: Vec<ContributorStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamWeeklyView {
    pub team_id: String,
    pub week_start: String,
    pub week_end: String,
    pub calendar: Vec<TeamDayColumn>,
    pub project_summary: Vec<ProjectWeekStats>,
    pub updated_at: Timestamp,
}

impl TeamWeeklyView {
    /// Lay `stats` (keyed by member id) out as a calendar plus per-project
    /// totals. Members without stats still get empty cells.
    pub fn build(
        team_id: &str,
        monday: NaiveDate,
        members: &[TeamMember],
        stats: &HashMap<String, MemberWeeklyStats>,
    ) -> Self {
        let calendar = week_days(monday)
            .zip(1u8..)
            .map(|(day, day_of_week)| {
                let date = format_date(day);
                let members = members
                    .iter()
                    .map(|member| {
                        let daily = stats.get(&member.id).and_then(|s| s.day(&date));
                        let git = daily.and_then(|d| d.git_stats.as_ref());
                        let commits = git.map_or(0, |g| g.total_commits);
                        MemberDayCell {
                            member_id: member.id.clone(),
                            member_name: member.name.clone(),
                            activity_level: activity_level(commits),
                            commits,
                            lines_changed: git.map_or(0, |g| g.total_added + g.total_removed),
                            has_report: daily.is_some_and(|d| d.has_report),
                            is_online: member.is_online,
                        }
                    })
                    .collect();
                TeamDayColumn {
                    date,
                    day_of_week,
                    members,
                }
            })
            .collect();

        Self {
            team_id: team_id.to_string(),
            week_start: format_date(monday),
            week_end: format_date(monday + Duration::days(6)),
            calendar,
            project_summary: project_summary(members, stats),
            updated_at: now(),
        }
    }
}

fn project_summary(
    members: &[TeamMember],
    stats: &HashMap<String, MemberWeeklyStats>,
) -> Vec<ProjectWeekStats> {
    // repo -> (project, member id -> contributor)
    let mut projects: BTreeMap<String, (ProjectWeekStats, BTreeMap<String, ContributorStats>)> =
        BTreeMap::new();

    for member in members {
        let Some(week) = stats.get(&member.id) else {
            continue;
        };
        let git_days = week.daily_stats.iter().filter_map(|d| d.git_stats.as_ref());
        for project in git_days.flat_map(|g| g.projects.iter()) {
            if project.repo_url.is_empty() {
                continue;
            }
            let key = normalize_repo_url(&project.repo_url);
            let (totals, contributors) = projects.entry(key).or_insert_with(|| {
                (
                    ProjectWeekStats {
                        project_name: project.project_name.clone(),
                        repo_url: project.repo_url.clone(),
                        ..Default::default()
                    },
                    BTreeMap::new(),
                )
            });
            totals.total_commits += project.commits;
            totals.total_added += project.lines_added;
            totals.total_removed += project.lines_removed;

            let contributor = contributors
                .entry(member.id.clone())
                .or_insert_with(|| ContributorStats {
                    member_id: member.id.clone(),
                    member_name: member.name.clone(),
                    ..Default::default()
                });
            contributor.commits += project.commits;
            contributor.lines_added += project.lines_added;
            contributor.lines_removed += project.lines_removed;
        }
    }

    let mut summary: Vec<ProjectWeekStats> = projects
        .into_values()
        .map(|(mut totals, contributors)| {
            totals.contributors = contributors.into_values().collect();
            totals
                .contributors
                .sort_by(|a, b| b.commits.cmp(&a.commits).then(a.member_name.cmp(&b.member_name)));
            totals
        })
        .collect();
    summary.sort_by(|a, b| b.total_commits.cmp(&a.total_commits).then(a.repo_url.cmp(&b.repo_url)));
    summary
}

#[cfg(test)]
pub(crate) fn git_day(date: &str, projects: &[(&str, u32, u64, u64)]) -> MemberDailyStats {
    let mut git = GitDailyStats {
        projects: projects
            .iter()
            .map(|(repo, commits, added, removed)| ProjectGitStats {
                project_name: repo.rsplit('/').next().unwrap_or(repo).to_string(),
                repo_url: repo.to_string(),
                commits: *commits,
                lines_added: *added,
                lines_removed: *removed,
                commit_messages: vec![],
            })
            .collect(),
        ..Default::default()
    };
    git.retain_repos(&[]);
    MemberDailyStats {
        date: date.to_string(),
        git_stats: Some(git),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_week_start_of() {
        // 2026-10-19 is a Monday
        assert_eq!(week_start_of(day("2026-10-19")), day("2026-10-19"));
        assert_eq!(week_start_of(day("2026-10-22")), day("2026-10-19"));
        assert_eq!(week_start_of(day("2026-10-25")), day("2026-10-19"));
        assert_eq!(week_start_of(day("2026-10-26")), day("2026-10-26"));
        assert!(parse_date("2026-13-01").is_err());
        assert!(parse_date("19/10/2026").is_err());
    }

    #[test]
    fn test_normalize_repo_url() {
        let forms = [
            "git@github.com:acme/api.git",
            "https://github.com/acme/api",
            "https://github.com/acme/api.git/",
            "ssh://git@github.com/acme/api.git",
            "GitHub.com/Acme/API",
        ];
        for form in forms {
            assert_eq!(normalize_repo_url(form), "github.com/acme/api", "{form}");
        }
        assert_eq!(
            normalize_repo_url("https://git.example.com:8443/team/tool.git"),
            "git.example.com:8443/team/tool"
        );
    }

    #[test]
    fn test_activity_levels() {
        let levels: Vec<u8> = [0, 1, 2, 3, 5, 6, 10, 11, 40].map(activity_level).to_vec();
        assert_eq!(levels, vec![0, 1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn test_retain_repos_recomputes_totals() {
        let mut git = git_day(
            "2026-10-19",
            &[("github.com/acme/api", 3, 30, 3), ("github.com/acme/web", 2, 20, 2)],
        )
        .git_stats
        .unwrap();
        assert_eq!(git.total_commits, 5);

        git.retain_repos(&["git@github.com:acme/web.git".to_string()]);
        assert_eq!(git.projects.len(), 1);
        assert_eq!(git.total_commits, 2);
        assert_eq!(git.total_added, 20);
    }

    #[test]
    fn test_build_view_calendar_and_projects() {
        let monday = day("2026-10-19");
        let mut ada = TeamMember::new("m1", "Ada", "127.0.0.1:1", false);
        ada.is_online = true;
        let mut bo = TeamMember::new("m2", "Bo", "127.0.0.1:2", false);
        bo.is_online = false;
        let cy = TeamMember::new("m3", "Cy", "127.0.0.1:3", false);

        let week = |days: Vec<MemberDailyStats>| MemberWeeklyStats {
            member_id: String::new(),
            member_name: String::new(),
            week_start: "2026-10-19".into(),
            daily_stats: days,
            updated_at: now(),
        };
        let mut ada_monday = git_day("2026-10-19", &[("github.com/acme/api", 4, 40, 4)]);
        ada_monday.has_report = true;
        let stats = HashMap::from([
            (
                "m1".to_string(),
                week(vec![
                    ada_monday,
                    git_day("2026-10-21", &[("git@github.com:acme/api.git", 12, 100, 10)]),
                ]),
            ),
            (
                "m2".to_string(),
                week(vec![git_day(
                    "2026-10-19",
                    &[("github.com/acme/api", 1, 5, 0), ("github.com/acme/web", 2, 8, 1)],
                )]),
            ),
        ]);

        let view = TeamWeeklyView::build("t1", monday, &[ada, bo, cy], &stats);
        assert_eq!(view.week_start, "2026-10-19");
        assert_eq!(view.week_end, "2026-10-25");
        assert_eq!(view.calendar.len(), 7);
        assert_eq!(view.calendar[6].day_of_week, 7);

        let monday_cells = &view.calendar[0].members;
        assert_eq!(monday_cells.len(), 3);
        assert_eq!(monday_cells[0].commits, 4);
        assert_eq!(monday_cells[0].lines_changed, 44);
        assert_eq!(monday_cells[0].activity_level, 2);
        assert!(monday_cells[0].has_report);
        assert!(!monday_cells[1].is_online);
        assert_eq!(monday_cells[1].commits, 3);
        assert_eq!(monday_cells[2].commits, 0);
        assert_eq!(view.calendar[2].members[0].activity_level, 4);

        // ssh and https remotes of api fold into one project
        assert_eq!(view.project_summary.len(), 2);
        let api = &view.project_summary[0];
        assert_eq!(api.total_commits, 17);
        assert_eq!(api.contributors.len(), 2);
        assert_eq!(api.contributors[0].member_name, "Ada");
        assert_eq!(api.contributors[0].commits, 16);
        assert_eq!(view.project_summary[1].total_commits, 2);
    }
}
