//! Presence channel messages.
//!
//! Every frame on a presence channel is one JSON text message:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Event                                                       │
//! │  ├── type:      EventType (snake_case tag)                   │
//! │  ├── team_id:   team the event belongs to                    │
//! │  ├── timestamp: when the leader (or sender) created it       │
//! │  └── payload:   type-specific JSON, see parse_payload::<T>() │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TeamError, TeamResult};
use crate::skill::index::SkillPackageMeta;
use crate::team::model::TeamMember;
use crate::types::{now, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MemberJoined,
    MemberLeft,
    MemberOnline,
    MemberOffline,
    MemberStatusChanged,
    CodeShared,
    SessionShared,
    CommentAdded,
    DailySummaryShared,
    SkillPublished,
    SkillUpdated,
    SkillDeleted,
    ProjectConfigUpdated,
    TeamDissolved,
    Ping,
    Pong,
    Auth,
    AuthResult,
}

impl EventType {
    /// Types a member may send to the leader after authenticating.
    pub fn accepted_from_member(&self) -> bool {
        matches!(
            self,
            EventType::Ping
                | EventType::MemberStatusChanged
                | EventType::CodeShared
                | EventType::SessionShared
                | EventType::CommentAdded
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the wire name
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Envelope of every presence frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub team_id: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new<P: Serialize>(event_type: EventType, team_id: &str, payload: &P) -> TeamResult<Self> {
        Ok(Self {
            event_type,
            team_id: team_id.to_string(),
            timestamp: now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// An event without payload.
    pub fn bare(event_type: EventType, team_id: &str) -> Self {
        Self {
            event_type,
            team_id: team_id.to_string(),
            timestamp: now(),
            payload: Value::Null,
        }
    }

    pub fn parse_payload<T: DeserializeOwned>(&self) -> TeamResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            TeamError::validation(format!("invalid {} payload: {}", self.event_type, e))
        })
    }

    pub fn to_text(&self) -> TeamResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> TeamResult<Self> {
        serde_json::from_str(text).map_err(|e| TeamError::validation(format!("invalid event: {}", e)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Payloads
// ═══════════════════════════════════════════════════════════════════════════

/// First frame a member sends on a new channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub member_id: String,
    pub member_name: String,
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResultPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of `member_joined`, `member_left`, `member_online`, `member_offline`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEventPayload {
    pub member_id: String,
    pub member_name: String,
    /// Full record on `member_joined`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<TeamMember>,
}

impl MemberEventPayload {
    pub fn of(member: &TeamMember) -> Self {
        Self {
            member_id: member.id.clone(),
            member_name: member.name.clone(),
            member: Some(member.clone()),
        }
    }
}

/// Payload of `skill_published`, `skill_updated`, `skill_deleted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEventPayload {
    pub plugin_id: String,
    /// Absent on `skill_deleted`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<SkillPackageMeta>,
}
