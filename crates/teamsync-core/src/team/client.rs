//! Outbound HTTP calls to the leader and to other peers.
//!
//! Every call carries a bounded timeout and is attempted once. Failures are
//! classified so callers can tell the two cases apart:
//!
//! - the request never got an answer (refused, reset, timed out): the target
//!   is *unavailable* (`LeaderUnavailable` / `PeerUnavailable`);
//! - the target answered with a non-2xx status: the status and body are
//!   relayed unchanged as `TeamError::Remote`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{TeamError, TeamResult};
use crate::report::model::{MemberDailyDetail, MemberWeeklyStats};
use crate::skill::index::{SkillPackageMeta, TeamSkillIndex};
use crate::skill::packager::MAX_ARCHIVE_SIZE;
use crate::team::model::{JoinRequest, JoinResponse, LeaveRequest, TeamInfo, TeamMember};
use crate::types::http_url;

/// Who is on the other end, which decides the "unavailable" variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Leader,
    Peer,
}

impl Target {
    fn unavailable(self, endpoint: &str, cause: &reqwest::Error) -> TeamError {
        let detail = format!("{}: {}", endpoint, cause);
        match self {
            Target::Leader => TeamError::LeaderUnavailable(detail),
            Target::Peer => TeamError::PeerUnavailable(detail),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MembershipClient {
    http: reqwest::Client,
    membership_timeout: Duration,
    forward_timeout: Duration,
    download_timeout: Duration,
    max_archive_size: u64,
}

impl MembershipClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            membership_timeout: config.membership_timeout,
            forward_timeout: config.forward_timeout,
            download_timeout: config.download_timeout,
            max_archive_size: MAX_ARCHIVE_SIZE,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Membership
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn fetch_team_info(&self, endpoint: &str) -> TeamResult<TeamInfo> {
        self.get_json(Target::Leader, endpoint, "/team/info", self.membership_timeout)
            .await
    }

    pub async fn join(
        &self,
        endpoint: &str,
        team_id: &str,
        request: &JoinRequest,
    ) -> TeamResult<JoinResponse> {
        let path = format!("/team/{}/join", team_id);
        self.post_json(Target::Leader, endpoint, &path, request, self.membership_timeout)
            .await
    }

    pub async fn leave(&self, endpoint: &str, team_id: &str, member_id: &str) -> TeamResult<()> {
        let path = format!("/team/{}/leave", team_id);
        let request = LeaveRequest {
            member_id: member_id.to_string(),
        };
        let _: serde_json::Value = self
            .post_json(Target::Leader, endpoint, &path, &request, self.membership_timeout)
            .await?;
        Ok(())
    }

    pub async fn members(&self, endpoint: &str, team_id: &str) -> TeamResult<Vec<TeamMember>> {
        let path = format!("/team/{}/members", team_id);
        self.get_json(Target::Leader, endpoint, &path, self.membership_timeout)
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Leader Forwards
    // ═══════════════════════════════════════════════════════════════════════

    /// POST a collaboration write to the leader.
    pub async fn forward_post<B, R>(&self, endpoint: &str, path: &str, body: &B) -> TeamResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.post_json(Target::Leader, endpoint, path, body, self.forward_timeout)
            .await
    }

    /// GET a collaboration read from the leader.
    pub async fn forward_get<R: DeserializeOwned>(&self, endpoint: &str, path: &str) -> TeamResult<R> {
        self.get_json(Target::Leader, endpoint, path, self.forward_timeout)
            .await
    }

    pub async fn forward_delete(&self, endpoint: &str, path: &str) -> TeamResult<()> {
        let url = http_url(endpoint, path);
        let response = self
            .http
            .delete(&url)
            .timeout(self.forward_timeout)
            .send()
            .await
            .map_err(|e| Target::Leader.unavailable(endpoint, &e))?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn skill_index(&self, endpoint: &str, team_id: &str) -> TeamResult<TeamSkillIndex> {
        let path = format!("/team/{}/skills", team_id);
        self.forward_get(endpoint, &path).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Skill Transfer
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn skill_meta(&self, endpoint: &str, plugin_id: &str) -> TeamResult<SkillPackageMeta> {
        let path = format!("/p2p/skills/{}/meta", plugin_id);
        self.get_json(Target::Peer, endpoint, &path, self.membership_timeout)
            .await
    }

    /// Fetch a packed skill archive from its author.
    ///
    /// The body is read chunk by chunk and abandoned as soon as it grows past
    /// the archive size limit, whatever `Content-Length` claims.
    pub async fn download_archive(&self, endpoint: &str, plugin_id: &str) -> TeamResult<Vec<u8>> {
        let url = http_url(endpoint, &format!("/p2p/skills/{}/download", plugin_id));
        let response = self
            .http
            .get(&url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| Target::Peer.unavailable(endpoint, &e))?;
        let mut response = check_status(response).await?;
        let too_large = || {
            TeamError::validation(format!(
                "archive for '{}' exceeds maximum size of {} bytes",
                plugin_id, self.max_archive_size
            ))
        };
        if response.content_length().is_some_and(|len| len > self.max_archive_size) {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Target::Peer.unavailable(endpoint, &e))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_archive_size {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!(%endpoint, %plugin_id, bytes = bytes.len(), "Downloaded skill archive");
        Ok(bytes)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Activity Stats
    // ═══════════════════════════════════════════════════════════════════════

    /// Ask a member for its week starting at `week_start`.
    pub async fn weekly_stats(
        &self,
        endpoint: &str,
        week_start: &str,
        repo_urls: &[String],
    ) -> TeamResult<MemberWeeklyStats> {
        let query = [("week_start", week_start.to_string()), ("repo_urls", repo_urls.join(","))];
        self.get_json_query(Target::Peer, endpoint, "/p2p/weekly-stats", &query, self.forward_timeout)
            .await
    }

    pub async fn daily_detail(
        &self,
        endpoint: &str,
        date: &str,
        repo_urls: &[String],
    ) -> TeamResult<MemberDailyDetail> {
        let query = [("date", date.to_string()), ("repo_urls", repo_urls.join(","))];
        self.get_json_query(Target::Peer, endpoint, "/p2p/daily-detail", &query, self.forward_timeout)
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    async fn get_json_query<R: DeserializeOwned>(
        &self,
        target: Target,
        endpoint: &str,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> TeamResult<R> {
        let url = http_url(endpoint, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| target.unavailable(endpoint, &e))?;
        decode(check_status(response).await?).await
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        target: Target,
        endpoint: &str,
        path: &str,
        timeout: Duration,
    ) -> TeamResult<R> {
        let url = http_url(endpoint, path);
        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| target.unavailable(endpoint, &e))?;
        decode(check_status(response).await?).await
    }

    async fn post_json<B, R>(
        &self,
        target: Target,
        endpoint: &str,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> TeamResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = http_url(endpoint, path);
        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| target.unavailable(endpoint, &e))?;
        decode(check_status(response).await?).await
    }
}

/// Turn a non-2xx answer into `TeamError::Remote`.
async fn check_status(response: reqwest::Response) -> TeamResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TeamError::Remote {
        status: status.as_u16(),
        body,
    })
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> TeamResult<R> {
    response
        .json()
        .await
        .map_err(|e| TeamError::Http(format!("invalid response body: {}", e)))
}
