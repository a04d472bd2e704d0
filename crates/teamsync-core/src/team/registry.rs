//! The single active team record.
//!
//! A node holds at most one team. On the leader the record carries the
//! authoritative member list; on a member it is a mirror refreshed from the
//! leader's join response, member queries and presence events.
//!
//! The registry is an injected instance owned by the node. State is guarded
//! internally and every mutation is written through to `team.json` before
//! the lock is released, so memory and disk never disagree.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TeamError, TeamResult};
use crate::storage::{Storage, TEAM_FILE};
use crate::team::model::{MemberWorkStatus, Team, TeamMember};
use crate::types::now;

/// What `team.json` holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team: Team,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

/// Result of [`TeamRegistry::upsert_member`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    /// Already a member; endpoint and name were refreshed
    Refreshed,
}

#[derive(Clone)]
pub struct TeamRegistry {
    storage: Storage,
    state: Arc<RwLock<Option<TeamRecord>>>,
}

impl TeamRegistry {
    /// Load the persisted record, if any.
    pub fn load(storage: Storage) -> TeamResult<Self> {
        let record: Option<TeamRecord> = storage.read_json(TEAM_FILE)?;
        if let Some(r) = &record {
            debug!(team_id = %r.team.id, is_leader = r.team.is_leader, "Loaded team record");
        }
        Ok(Self {
            storage,
            state: Arc::new(RwLock::new(record)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub fn current(&self) -> Option<Team> {
        self.state.read().as_ref().map(|r| r.team.clone())
    }

    /// Zero or one team.
    pub fn list_teams(&self) -> Vec<Team> {
        self.current().into_iter().collect()
    }

    /// The held team if its id is `team_id`.
    pub fn get(&self, team_id: &str) -> TeamResult<Team> {
        self.current()
            .filter(|t| t.id == team_id)
            .ok_or_else(|| TeamError::TeamNotFound(team_id.to_string()))
    }

    pub fn record(&self) -> Option<TeamRecord> {
        self.state.read().clone()
    }

    pub fn members(&self) -> Vec<TeamMember> {
        self.state
            .read()
            .as_ref()
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    pub fn member(&self, member_id: &str) -> Option<TeamMember> {
        self.state
            .read()
            .as_ref()
            .and_then(|r| r.members.iter().find(|m| m.id == member_id).cloned())
    }

    pub fn is_member(&self, member_id: &str) -> bool {
        self.member(member_id).is_some()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Install / Clear
    // ═══════════════════════════════════════════════════════════════════════

    /// Install a newly created team with the leader as the only member.
    pub fn install_leader_team(&self, mut team: Team, leader: TeamMember) -> TeamResult<()> {
        let mut state = self.state.write();
        if let Some(existing) = state.as_ref() {
            return Err(TeamError::TeamAlreadyExists(existing.team.id.clone()));
        }
        team.is_leader = true;
        team.leader_online = true;
        team.member_count = 1;
        let record = TeamRecord {
            team,
            members: vec![leader],
        };
        self.storage.write_json(TEAM_FILE, &record)?;
        *state = Some(record);
        Ok(())
    }

    /// Install (or refresh) the member-side mirror of a joined team.
    ///
    /// Replacing the mirror of the same team is allowed; a different team
    /// is rejected with `AlreadyInTeam`.
    pub fn install_member_team(&self, mut team: Team, members: Vec<TeamMember>) -> TeamResult<()> {
        let mut state = self.state.write();
        if let Some(existing) = state.as_ref() {
            if existing.team.id != team.id {
                return Err(TeamError::AlreadyInTeam(existing.team.id.clone()));
            }
            team.joined_at = existing.team.joined_at;
        }
        team.is_leader = false;
        team.leader_online = true;
        team.member_count = members.len();
        let record = TeamRecord { team, members };
        self.storage.write_json(TEAM_FILE, &record)?;
        *state = Some(record);
        Ok(())
    }

    /// Forget the team. Returns false if `team_id` was not held.
    pub fn clear(&self, team_id: &str) -> TeamResult<bool> {
        let mut state = self.state.write();
        match state.as_ref() {
            Some(r) if r.team.id == team_id => {
                self.storage.remove(TEAM_FILE)?;
                *state = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Member Table
    // ═══════════════════════════════════════════════════════════════════════

    /// Add a member, or refresh name/endpoint of an existing one.
    pub fn upsert_member(&self, member: TeamMember) -> TeamResult<UpsertOutcome> {
        self.mutate(|record| {
            let outcome = match record.members.iter_mut().find(|m| m.id == member.id) {
                Some(existing) => {
                    existing.name = member.name;
                    existing.endpoint = member.endpoint;
                    existing.is_online = member.is_online;
                    existing.last_seen = now();
                    UpsertOutcome::Refreshed
                }
                None => {
                    record.members.push(member);
                    UpsertOutcome::Added
                }
            };
            Ok(outcome)
        })
    }

    /// Remove a member. Returns false if unknown.
    pub fn remove_member(&self, member_id: &str) -> TeamResult<bool> {
        self.mutate(|record| {
            let before = record.members.len();
            record.members.retain(|m| m.id != member_id);
            Ok(record.members.len() != before)
        })
    }

    /// Returns false if the member is unknown.
    pub fn set_member_online(&self, member_id: &str, online: bool) -> TeamResult<bool> {
        self.mutate(|record| {
            Ok(match record.members.iter_mut().find(|m| m.id == member_id) {
                Some(m) => {
                    m.is_online = online;
                    m.last_seen = now();
                    true
                }
                None => false,
            })
        })
    }

    /// Store the latest work status of a member. Returns false if unknown.
    pub fn set_work_status(&self, status: MemberWorkStatus) -> TeamResult<bool> {
        self.mutate(|record| {
            Ok(
                match record.members.iter_mut().find(|m| m.id == status.member_id) {
                    Some(m) => {
                        m.last_seen = now();
                        m.work_status = Some(status);
                        true
                    }
                    None => false,
                },
            )
        })
    }

    /// Replace the member mirror wholesale (member side).
    pub fn replace_members(&self, members: Vec<TeamMember>) -> TeamResult<()> {
        self.mutate(|record| {
            record.members = members;
            Ok(())
        })
    }

    /// Track presence connectivity to the leader (member side).
    pub fn set_leader_online(&self, online: bool) -> TeamResult<()> {
        self.mutate(|record| {
            record.team.leader_online = online;
            if let Some(leader) = record.members.iter_mut().find(|m| m.is_leader) {
                leader.is_online = online;
            }
            Ok(())
        })
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut TeamRecord) -> TeamResult<T>) -> TeamResult<T> {
        let mut state = self.state.write();
        let record = state
            .as_mut()
            .ok_or_else(|| TeamError::TeamNotFound("no active team".to_string()))?;
        let out = f(record)?;
        record.team.member_count = record.members.len();
        self.storage.write_json(TEAM_FILE, &*record)?;
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) fn sample_team(id: &str, is_leader: bool) -> Team {
    Team {
        id: id.to_string(),
        name: "T".to_string(),
        leader_id: "leader".to_string(),
        leader_name: "Leader".to_string(),
        leader_endpoint: "127.0.0.1:19960".to_string(),
        is_leader,
        leader_online: true,
        member_count: 1,
        created_at: now(),
        joined_at: now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(temp: &TempDir) -> TeamRegistry {
        TeamRegistry::load(Storage::new(temp.path()).unwrap()).unwrap()
    }

    fn leader_member() -> TeamMember {
        TeamMember::new("leader", "Leader", "127.0.0.1:19960", true)
    }

    #[test]
    fn test_at_most_one_team() {
        let temp = TempDir::new().unwrap();
        let reg = registry(&temp);

        reg.install_leader_team(sample_team("t1", true), leader_member())
            .unwrap();
        let err = reg
            .install_leader_team(sample_team("t2", true), leader_member())
            .unwrap_err();
        assert!(matches!(err, TeamError::TeamAlreadyExists(_)));

        let err = reg
            .install_member_team(sample_team("t3", false), vec![])
            .unwrap_err();
        assert!(matches!(err, TeamError::AlreadyInTeam(_)));
        assert_eq!(reg.list_teams().len(), 1);
    }

    #[test]
    fn test_upsert_and_remove() {
        let temp = TempDir::new().unwrap();
        let reg = registry(&temp);
        reg.install_leader_team(sample_team("t1", true), leader_member())
            .unwrap();

        let m = TeamMember::new("m1", "Member", "10.0.0.2:1", false);
        assert_eq!(reg.upsert_member(m.clone()).unwrap(), UpsertOutcome::Added);
        assert_eq!(reg.current().unwrap().member_count, 2);

        let mut moved = m.clone();
        moved.endpoint = "10.0.0.3:1".into();
        assert_eq!(reg.upsert_member(moved).unwrap(), UpsertOutcome::Refreshed);
        assert_eq!(reg.current().unwrap().member_count, 2);
        assert_eq!(reg.member("m1").unwrap().endpoint, "10.0.0.3:1");

        assert!(reg.remove_member("m1").unwrap());
        assert!(!reg.remove_member("m1").unwrap());
        assert_eq!(reg.current().unwrap().member_count, 1);
    }

    #[test]
    fn test_persists_across_reload() {
        let temp = TempDir::new().unwrap();
        {
            let reg = registry(&temp);
            reg.install_leader_team(sample_team("t1", true), leader_member())
                .unwrap();
            reg.set_work_status(MemberWorkStatus {
                member_id: "leader".into(),
                member_name: "Leader".into(),
                project_name: "P".into(),
                current_file: "f.go".into(),
                status_visible: true,
                last_active_at: now(),
            })
            .unwrap();
        }

        let reg = registry(&temp);
        let leader = reg.member("leader").unwrap();
        assert_eq!(leader.work_status.unwrap().project_name, "P");
        assert!(reg.get("t1").unwrap().is_leader);
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let reg = registry(&temp);
        reg.install_member_team(sample_team("t1", false), vec![leader_member()])
            .unwrap();

        assert!(!reg.clear("other").unwrap());
        assert!(reg.clear("t1").unwrap());
        assert!(reg.list_teams().is_empty());
        assert!(registry(&temp).current().is_none());
    }

    #[test]
    fn test_leader_online_tracking() {
        let temp = TempDir::new().unwrap();
        let reg = registry(&temp);
        reg.install_member_team(sample_team("t1", false), vec![leader_member()])
            .unwrap();

        reg.set_leader_online(false).unwrap();
        assert!(!reg.current().unwrap().leader_online);
        assert!(!reg.member("leader").unwrap().is_online);
    }

    #[test]
    fn test_mutation_without_team() {
        let temp = TempDir::new().unwrap();
        let reg = registry(&temp);
        assert!(matches!(
            reg.remove_member("x"),
            Err(TeamError::TeamNotFound(_))
        ));
    }
}
