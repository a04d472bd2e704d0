//! Leader-side cache of members' weekly stats.
//!
//! Fresh entries (younger than [`CACHE_TTL`]) stand in for a fetch. Expired
//! entries are kept for another week so the report can still show members
//! who are offline or not answering.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::TeamResult;
use crate::report::model::MemberWeeklyStats;
use crate::storage::{weekly_stats_cache_file, Storage};
use crate::types::{now, Timestamp};

/// How long fetched stats count as fresh
pub const CACHE_TTL: Duration = Duration::hours(1);
/// How long past expiry stale stats are still kept as a fallback
pub const STALE_RETENTION: Duration = Duration::days(7);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub member_id: String,
    pub week_start: String,
    pub stats: MemberWeeklyStats,
    pub cached_at: Timestamp,
    pub expire_at: Timestamp,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        now() > self.expire_at
    }
}

/// Contents of `weekly-stats-cache/{team}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStatsCache {
    pub team_id: String,
    #[serde(default)]
    pub entries: Vec<CacheEntry>,
    pub updated_at: Timestamp,
}

impl WeeklyStatsCache {
    pub fn load(storage: &Storage, team_id: &str) -> TeamResult<Self> {
        Ok(storage
            .read_json(&weekly_stats_cache_file(team_id))?
            .unwrap_or_else(|| Self {
                team_id: team_id.to_string(),
                entries: Vec::new(),
                updated_at: now(),
            }))
    }

    pub fn save(&self, storage: &Storage) -> TeamResult<()> {
        storage.write_json(&weekly_stats_cache_file(&self.team_id), self)
    }

    pub fn get(&self, member_id: &str, week_start: &str) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .find(|e| e.member_id == member_id && e.week_start == week_start)
    }

    /// Store `stats` under its member and week, replacing what was there.
    pub fn set(&mut self, stats: MemberWeeklyStats, ttl: Duration) {
        let cached_at = now();
        let entry = CacheEntry {
            member_id: stats.member_id.clone(),
            week_start: stats.week_start.clone(),
            stats,
            cached_at,
            expire_at: cached_at + ttl,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.member_id == entry.member_id && e.week_start == entry.week_start)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self.updated_at = cached_at;
    }

    /// Drop entries that expired more than [`STALE_RETENTION`] ago.
    pub fn clean_expired(&mut self) -> usize {
        let cutoff = now() - STALE_RETENTION;
        let before = self.entries.len();
        self.entries.retain(|e| e.expire_at > cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.updated_at = now();
        }
        removed
    }
}
