//! Weekly team report: per-member git and session activity collected by
//! the leader and laid out as a calendar.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  WeeklyReportService (leader only)                         │
//! │  ├── WeeklyStatsCache: 1h fresh, stale kept as fallback    │
//! │  ├── self:    WeeklyStatsProvider                          │
//! │  └── members: GET /p2p/weekly-stats, /p2p/daily-detail     │
//! │               answered by their own WeeklyStatsProvider    │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod model;
pub mod provider;
pub mod service;

pub use cache::WeeklyStatsCache;
pub use model::{MemberDailyDetail, MemberDailyStats, MemberWeeklyStats, TeamWeeklyView};
pub use provider::{FileWeeklyStatsProvider, WeeklyStatsProvider};
pub use service::{RefreshOutcome, WeeklyReportDeps, WeeklyReportService};
