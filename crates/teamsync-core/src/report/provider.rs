//! Where a node's own activity numbers come from.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::collab::DailySummaryStore;
use crate::error::TeamResult;
use crate::report::model::{
    format_date, week_days, GitDailyStats, MemberDailyStats, MemberWeeklyStats, SessionDailyStats,
    WorkItemSummary,
};
use crate::types::now;

/// Source of this node's daily activity, queried when the leader asks for
/// a weekly report.
pub trait WeeklyStatsProvider: Send + Sync {
    /// Activity on `date`, limited to `repo_urls` (all repos when empty).
    fn daily_stats(&self, date: NaiveDate, repo_urls: &[String]) -> TeamResult<MemberDailyStats>;

    /// Seven days from `monday`.
    fn weekly_stats(&self, monday: NaiveDate, repo_urls: &[String]) -> TeamResult<MemberWeeklyStats> {
        let daily_stats = week_days(monday)
            .map(|day| self.daily_stats(day, repo_urls))
            .collect::<TeamResult<Vec<_>>>()?;
        Ok(MemberWeeklyStats {
            member_id: String::new(),
            member_name: String::new(),
            week_start: format_date(monday),
            daily_stats,
            updated_at: now(),
        })
    }
}

/// Layout of `{dir}/{date}.json`, written by whatever tooling records the
/// day's git and session activity
#[derive(Debug, Default, Deserialize)]
struct RecordedDay {
    #[serde(default)]
    git_stats: Option<GitDailyStats>,
    #[serde(default)]
    session_stats: Option<SessionDailyStats>,
    #[serde(default)]
    work_items: Vec<WorkItemSummary>,
}

/// Reads recorded activity files; a day counts as reported when the local
/// daily summary store has an entry for it.
pub struct FileWeeklyStatsProvider {
    dir: PathBuf,
    summaries: Arc<dyn DailySummaryStore>,
}

impl FileWeeklyStatsProvider {
    pub fn new(dir: impl Into<PathBuf>, summaries: Arc<dyn DailySummaryStore>) -> Self {
        Self {
            dir: dir.into(),
            summaries,
        }
    }

    fn recorded(&self, date: &str) -> TeamResult<RecordedDay> {
        let path = self.dir.join(format!("{}.json", date));
        match std::fs::read(&path) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecordedDay::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl WeeklyStatsProvider for FileWeeklyStatsProvider {
    fn daily_stats(&self, date: NaiveDate, repo_urls: &[String]) -> TeamResult<MemberDailyStats> {
        let date = format_date(date);
        let recorded = self.recorded(&date)?;

        let git_stats = recorded
            .git_stats
            .map(|mut git| {
                git.retain_repos(repo_urls);
                git
            })
            .filter(|git| git.total_commits > 0);
        let session_stats = recorded.session_stats.filter(|s| s.session_count > 0);
        let has_report = self.summaries.summary_for(&date)?.is_some();
        debug!(
            %date,
            commits = git_stats.as_ref().map_or(0, |g| g.total_commits),
            has_report,
            "Collected daily stats"
        );

        Ok(MemberDailyStats {
            date,
            git_stats,
            session_stats,
            work_items: recorded.work_items,
            has_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::FileDailySummaryStore;
    use crate::report::model::parse_date;
    use tempfile::TempDir;

    fn provider(temp: &TempDir) -> FileWeeklyStatsProvider {
        let activity = temp.path().join("activity");
        let summaries = temp.path().join("daily-summaries");
        std::fs::create_dir_all(&activity).unwrap();
        std::fs::create_dir_all(&summaries).unwrap();
        FileWeeklyStatsProvider::new(activity, Arc::new(FileDailySummaryStore::new(summaries)))
    }

    fn record(temp: &TempDir, date: &str, json: &str) {
        std::fs::write(temp.path().join("activity").join(format!("{date}.json")), json).unwrap();
    }

    #[test]
    fn test_week_filters_repos_and_marks_reports() {
        let temp = TempDir::new().unwrap();
        let p = provider(&temp);
        record(
            &temp,
            "2026-10-20",
            r#"{
                "git_stats": {"total_commits": 5, "total_added": 50, "total_removed": 5, "projects": [
                    {"project_name": "api", "repo_url": "git@github.com:acme/api.git", "commits": 3, "lines_added": 30, "lines_removed": 3},
                    {"project_name": "dotfiles", "repo_url": "github.com/ada/dotfiles", "commits": 2, "lines_added": 20, "lines_removed": 2}
                ]},
                "session_stats": {"session_count": 4, "tokens_used": 1200},
                "work_items": [{"project": "api", "category": "feature", "description": "pagination"}]
            }"#,
        );
        record(
            &temp,
            "2026-10-21",
            r#"{"git_stats": {"total_commits": 1, "total_added": 1, "total_removed": 0, "projects": [
                {"project_name": "dotfiles", "repo_url": "github.com/ada/dotfiles", "commits": 1, "lines_added": 1, "lines_removed": 0}
            ]}, "session_stats": {"session_count": 0}}"#,
        );
        std::fs::write(
            temp.path().join("daily-summaries/2026-10-20.json"),
            r#"{"summary": "pagination"}"#,
        )
        .unwrap();

        let repos = vec!["https://github.com/acme/api".to_string()];
        let week = p.weekly_stats(parse_date("2026-10-19").unwrap(), &repos).unwrap();
        assert_eq!(week.week_start, "2026-10-19");
        assert_eq!(week.daily_stats.len(), 7);

        let tuesday = week.day("2026-10-20").unwrap();
        let git = tuesday.git_stats.as_ref().unwrap();
        assert_eq!(git.total_commits, 3);
        assert_eq!(git.projects.len(), 1);
        assert_eq!(tuesday.session_stats.as_ref().unwrap().session_count, 4);
        assert_eq!(tuesday.work_items.len(), 1);
        assert!(tuesday.has_report);

        // Only untracked repos and no sessions: nothing left to report
        let wednesday = week.day("2026-10-21").unwrap();
        assert!(wednesday.git_stats.is_none());
        assert!(wednesday.session_stats.is_none());
        assert!(!wednesday.has_report);

        assert_eq!(week.day("2026-10-25").unwrap(), &MemberDailyStats {
            date: "2026-10-25".into(),
            ..Default::default()
        });
    }

    #[test]
    fn test_corrupt_activity_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let p = provider(&temp);
        record(&temp, "2026-10-19", "{not json");
        assert!(p.daily_stats(parse_date("2026-10-19").unwrap(), &[]).is_err());
    }
}
