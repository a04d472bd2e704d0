//! Team and membership records, plus the membership wire messages.

use serde::{Deserialize, Serialize};

use crate::skill::index::TeamSkillIndex;
use crate::types::{now, Timestamp};

/// The team this node leads or belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub leader_id: String,
    pub leader_name: String,
    /// `host:port` of the leader's HTTP surface
    pub leader_endpoint: String,
    /// True on the node that created the team. Fixed for the team's lifetime.
    pub is_leader: bool,
    /// Presence connectivity to the leader (always true on the leader)
    pub leader_online: bool,
    pub member_count: usize,
    pub created_at: Timestamp,
    pub joined_at: Timestamp,
}

/// Per-member "what am I working on" status. Last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberWorkStatus {
    pub member_id: String,
    pub member_name: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub current_file: String,
    #[serde(default)]
    pub status_visible: bool,
    pub last_active_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub is_leader: bool,
    pub is_online: bool,
    pub joined_at: Timestamp,
    pub last_seen: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_status: Option<MemberWorkStatus>,
}

impl TeamMember {
    /// A freshly joined, online member.
    pub fn new(id: &str, name: &str, endpoint: &str, is_leader: bool) -> Self {
        let ts = now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            is_leader,
            is_online: true,
            joined_at: ts,
            last_seen: ts,
            work_status: None,
        }
    }
}

/// `GET /team/info` and `GET /team/{id}/info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInfo {
    pub team: Team,
    pub members: Vec<TeamMember>,
}

/// `POST /team/{id}/join`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub member_id: String,
    pub member_name: String,
    /// Where the leader can reach the joining member
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub team: Team,
    pub members: Vec<TeamMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_index: Option<TeamSkillIndex>,
}

/// `POST /team/{id}/leave`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub member_id: String,
}

/// Local API: `POST /api/v1/teams`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Local API: `POST /api/v1/teams/join`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinTeamRequest {
    pub endpoint: String,
}
